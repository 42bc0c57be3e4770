pub mod audit;
pub mod dispatcher;
pub mod error;
pub mod redact;
pub mod registry;
pub mod resolver;
pub mod tools;

pub use audit::{AuditLogger, JsonlAuditLogger, NoopAuditLogger, DEFAULT_MAX_AUDIT_BYTES};
pub use dispatcher::DispatchGateway;
pub use error::ResolveError;
pub use redact::{Redactor, DEFAULT_MAX_DIAGNOSTIC_BYTES};
pub use registry::ToolRegistry;
pub use resolver::{
    canonical_path, split_command, structured_flags, ArgumentGuard, CatalogMatch, CommandResolver,
    Resolution, ResolvedCommand, ResolverOptions, RESERVED_OPTIONS,
};
pub use tools::{json_or_text, CommandCatalogTool, CommandHelpTool, RunCommandTool, Tool};
