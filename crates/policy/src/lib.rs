pub mod error;
pub mod generator;
pub mod store;
pub mod verbs;

pub use error::PolicyError;
pub use generator::{CatalogSource, GenerationReport, PolicyGenerator, StaticCatalog};
pub use store::{LockHolder, PolicyStore, StoreLock, STALE_LOCK_SECS};
pub use verbs::{VerbMatch, VerbMatcher, DEFAULT_DENIED_VERBS};
