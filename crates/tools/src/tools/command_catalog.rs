use super::base::Tool;
use crate::error::ResolveError;
use crate::resolver::{CatalogMatch, ResolvedCommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Top-level CLI help, listing the available services.
pub struct CommandCatalogTool;

impl Tool for CommandCatalogTool {
    fn name(&self) -> &'static str {
        "get_oci_commands"
    }

    fn description(&self) -> &'static str {
        "Lists the OCI CLI services and global options (the output of 'oci --help')."
    }

    fn schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    fn resolve(&self, _arguments: &BTreeMap<String, Value>) -> Result<ResolvedCommand, ResolveError> {
        Ok(ResolvedCommand {
            operation: None,
            args: vec!["--help".into()],
            policy_gated: false,
            catalog_match: CatalogMatch::Skip,
        })
    }

    fn payload(&self, stdout: String) -> Value {
        Value::String(stdout)
    }
}
