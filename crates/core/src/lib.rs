pub mod envelope;
pub mod metrics;
pub mod types;

pub use envelope::{DispatchState, ErrorDescriptor, ErrorKind, ResultEnvelope, Status, DENIAL_REASON};
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use types::*;
