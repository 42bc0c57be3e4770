pub mod catalog;
pub mod command_executor;
pub mod limits;

pub use catalog::{parse_help_commands, HelpCatalogSource};
pub use command_executor::{CommandExecutor, ExecOutput, ExecutorError, ProcessExecutor};
pub use limits::ResourceLimits;
