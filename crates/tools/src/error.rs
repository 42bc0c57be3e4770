use oci_gate_core::OperationId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("Command is empty")]
    EmptyCommand,

    #[error("Option {0} is set by the gateway and cannot be overridden")]
    ReservedOption(String),

    #[error("Forbidden token in command: {0}")]
    ForbiddenToken(String),

    #[error("Unexpected positional argument after options: {0}")]
    UnexpectedPositional(String),

    #[error("No catalog snapshot loaded to verify operation: {0}")]
    CatalogUnavailable(OperationId),

    #[error("Unknown operation: {0}")]
    UnknownOperation(OperationId),
}
