use super::base::{required_command, Tool};
use crate::error::ResolveError;
use crate::resolver::{canonical_path, split_command, CatalogMatch, ResolvedCommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;

pub struct CommandHelpTool;

impl Tool for CommandHelpTool {
    fn name(&self) -> &'static str {
        "get_oci_command_help"
    }

    fn description(&self) -> &'static str {
        "Returns helpful instructions for running an OCI CLI command. Only provide the command after 'oci'. \
         Commands are structured as <service> <resource> <action>, and help is available at each level \
         (compute, compute instance, compute instance list). If help for a specific command fails, \
         ask again with a less specific command."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Command path to describe, e.g. 'compute instance'"
                }
            },
            "required": ["command"]
        })
    }

    fn resolve(&self, arguments: &BTreeMap<String, Value>) -> Result<ResolvedCommand, ResolveError> {
        let tokens = split_command(required_command(arguments)?);
        let operation = canonical_path(&tokens)?;
        if operation.depth() != tokens.len() {
            return Err(ResolveError::InvalidArgument {
                name: "command".into(),
                reason: "help takes a command path only, without options".into(),
            });
        }

        let mut args = tokens;
        args.push("--help".into());

        // Reading help never mutates anything, so the denylist does not apply.
        Ok(ResolvedCommand {
            operation: Some(operation),
            args,
            policy_gated: false,
            catalog_match: CatalogMatch::Prefix,
        })
    }

    fn payload(&self, stdout: String) -> Value {
        Value::String(stdout)
    }
}
