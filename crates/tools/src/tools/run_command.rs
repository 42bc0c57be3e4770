use super::base::{required_command, Tool};
use crate::error::ResolveError;
use crate::resolver::{canonical_path, split_command, structured_flags, CatalogMatch, ResolvedCommand};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Runs one CLI command. The only tool subject to the denylist.
///
/// Options come either inline in `command` or as extra structured
/// arguments (`compartment_id: "..."` becomes `--compartment-id ...`).
pub struct RunCommandTool;

impl Tool for RunCommandTool {
    fn name(&self) -> &'static str {
        "run_oci_command"
    }

    fn description(&self) -> &'static str {
        "Runs an OCI CLI command. Only provide the command after 'oci', do not include the string 'oci' in your command."
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The OCI CLI command to run, e.g. 'compute instance list --compartment-id <ocid>'. Do not include 'oci' in your command."
                }
            },
            "required": ["command"],
            "additionalProperties": {
                "description": "Extra options, passed as --name value"
            }
        })
    }

    fn resolve(&self, arguments: &BTreeMap<String, Value>) -> Result<ResolvedCommand, ResolveError> {
        let mut args = split_command(required_command(arguments)?);
        let operation = canonical_path(&args)?;
        args.extend(structured_flags(arguments, &["command"])?);

        Ok(ResolvedCommand {
            operation: Some(operation),
            args,
            policy_gated: true,
            catalog_match: CatalogMatch::Exact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn test_resolve_inline_command() {
        let resolved = RunCommandTool
            .resolve(&args(&[("command", json!("oci os ns get"))]))
            .unwrap();
        assert_eq!(resolved.operation.unwrap().as_str(), "os ns get");
        assert_eq!(resolved.args, vec!["os", "ns", "get"]);
        assert!(resolved.policy_gated);
        assert_eq!(resolved.catalog_match, CatalogMatch::Exact);
    }

    #[test]
    fn test_resolve_appends_structured_options() {
        let resolved = RunCommandTool
            .resolve(&args(&[
                ("command", json!("compute instance list")),
                ("compartment_id", json!("ocid1.compartment.oc1..aaa")),
            ]))
            .unwrap();
        assert_eq!(
            resolved.args,
            vec!["compute", "instance", "list", "--compartment-id", "ocid1.compartment.oc1..aaa"]
        );
    }

    #[test]
    fn test_resolve_requires_command() {
        assert_eq!(
            RunCommandTool.resolve(&BTreeMap::new()),
            Err(ResolveError::MissingArgument("command"))
        );
        assert_eq!(
            RunCommandTool.resolve(&args(&[("command", json!("  oci "))])),
            Err(ResolveError::EmptyCommand)
        );
    }
}
