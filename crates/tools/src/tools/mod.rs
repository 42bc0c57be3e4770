pub mod base;
pub mod command_catalog;
pub mod command_help;
pub mod run_command;

pub use base::{json_or_text, Tool};
pub use command_catalog::CommandCatalogTool;
pub use command_help::CommandHelpTool;
pub use run_command::RunCommandTool;
