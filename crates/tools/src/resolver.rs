use crate::error::ResolveError;
use crate::registry::ToolRegistry;
use crate::tools::Tool;
use oci_gate_core::{CatalogSnapshot, InvocationRequest, OperationId};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Global options the gateway injects itself.
pub const RESERVED_OPTIONS: &[&str] = &["--profile", "--auth", "--config-file", "--cli-rc-file"];
const FILE_SCHEME: &str = "file://";
const CLI_NAME: &str = "oci";

/// How a resolved identifier is checked against the catalog snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMatch {
    /// Must be a leaf command in the snapshot.
    Exact,
    /// Must be a leaf or a group (prefix of a leaf).
    Prefix,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCommand {
    pub operation: Option<OperationId>,
    /// Arguments passed to the CLI after the gateway's global options.
    pub args: Vec<String>,
    pub policy_gated: bool,
    pub catalog_match: CatalogMatch,
}

#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Permit `file://` parameter values, which make the CLI read local files.
    pub allow_file_arguments: bool,
    /// Accept operations that cannot be checked because no catalog snapshot
    /// is loaded. Off by default, so a missing snapshot refuses every
    /// command the catalog would have to vouch for.
    pub allow_uncataloged: bool,
}

/// Rejects tokens the gateway must never hand to the CLI.
pub struct ArgumentGuard;

impl ArgumentGuard {
    pub fn validate(args: &[String], options: &ResolverOptions) -> Result<(), ResolveError> {
        for arg in args {
            if arg.chars().any(|c| c.is_control()) {
                return Err(ResolveError::ForbiddenToken(
                    "control character in argument".into(),
                ));
            }

            for &reserved in RESERVED_OPTIONS {
                if arg == reserved || arg.starts_with(&format!("{}=", reserved)) {
                    return Err(ResolveError::ReservedOption(reserved.to_string()));
                }
            }

            if !options.allow_file_arguments && arg.to_ascii_lowercase().contains(FILE_SCHEME) {
                return Err(ResolveError::ForbiddenToken(
                    "file:// arguments are not allowed".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Whitespace split, dropping a leading `oci` if the caller included it.
pub fn split_command(command: &str) -> Vec<String> {
    let mut tokens: Vec<String> = command.split_whitespace().map(str::to_string).collect();
    if tokens.first().map(String::as_str) == Some(CLI_NAME) {
        tokens.remove(0);
    }
    tokens
}

/// The command path: every token before the first option.
///
/// After the first option, each option may be followed by at most one value
/// (none for `--opt=value`). Anything else is rejected, so options can be
/// reordered freely without changing the identifier and cannot hide a
/// path segment.
pub fn canonical_path(tokens: &[String]) -> Result<OperationId, ResolveError> {
    if tokens.is_empty() {
        return Err(ResolveError::EmptyCommand);
    }

    let split = tokens
        .iter()
        .position(|t| t.starts_with('-'))
        .unwrap_or(tokens.len());
    let (path, options) = tokens.split_at(split);

    if path.is_empty() {
        return Err(ResolveError::InvalidArgument {
            name: "command".into(),
            reason: "must start with a command path, not an option".into(),
        });
    }

    let mut expecting_value = false;
    for token in options {
        if token.starts_with('-') {
            expecting_value = !token.contains('=');
        } else if expecting_value {
            expecting_value = false;
        } else {
            return Err(ResolveError::UnexpectedPositional(token.clone()));
        }
    }

    OperationId::from_segments(path).map_err(|e| ResolveError::InvalidArgument {
        name: "command".into(),
        reason: e.to_string(),
    })
}

/// Renders structured arguments as `--name value` pairs, in key order.
///
/// `true` becomes a bare flag, `false` and `null` are dropped, arrays and
/// objects are passed as JSON text.
pub fn structured_flags(
    arguments: &BTreeMap<String, Value>,
    skip: &[&str],
) -> Result<Vec<String>, ResolveError> {
    let mut flags = Vec::new();

    for (key, value) in arguments {
        if skip.contains(&key.as_str()) {
            continue;
        }

        let name = key.trim_start_matches('-').replace('_', "-");
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ResolveError::InvalidArgument {
                name: key.clone(),
                reason: "not a valid option name".into(),
            });
        }
        let flag = format!("--{}", name.to_ascii_lowercase());

        match value {
            Value::Bool(true) => flags.push(flag),
            Value::Bool(false) | Value::Null => {}
            Value::String(s) => {
                flags.push(flag);
                flags.push(s.clone());
            }
            Value::Number(n) => {
                flags.push(flag);
                flags.push(n.to_string());
            }
            other => {
                flags.push(flag);
                flags.push(other.to_string());
            }
        }
    }

    Ok(flags)
}

pub struct Resolution {
    pub tool: Arc<dyn Tool>,
    pub command: ResolvedCommand,
}

/// Maps a tool call to a vetted CLI invocation. Anything it cannot place
/// in the catalog is refused.
pub struct CommandResolver {
    registry: Arc<ToolRegistry>,
    catalog: Option<Arc<CatalogSnapshot>>,
    options: ResolverOptions,
}

impl CommandResolver {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            catalog: None,
            options: ResolverOptions::default(),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<CatalogSnapshot>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn resolve(&self, request: &InvocationRequest) -> Result<Resolution, ResolveError> {
        let tool = self
            .registry
            .get(&request.tool_name)
            .ok_or_else(|| ResolveError::UnknownTool(request.tool_name.clone()))?;

        let command = tool.resolve(&request.arguments)?;
        ArgumentGuard::validate(&command.args, &self.options)?;
        self.check_catalog(&command)?;

        debug!(
            "Resolved {} to {:?}",
            request.tool_name,
            command.operation.as_ref().map(OperationId::as_str)
        );
        Ok(Resolution { tool, command })
    }

    fn check_catalog(&self, command: &ResolvedCommand) -> Result<(), ResolveError> {
        let Some(operation) = &command.operation else {
            return Ok(());
        };
        if command.catalog_match == CatalogMatch::Skip {
            return Ok(());
        }

        let Some(catalog) = &self.catalog else {
            if self.options.allow_uncataloged {
                return Ok(());
            }
            warn!("Refusing {}: no catalog snapshot loaded", operation);
            return Err(ResolveError::CatalogUnavailable(operation.clone()));
        };

        let known = match command.catalog_match {
            CatalogMatch::Skip => true,
            CatalogMatch::Exact => catalog.contains(operation),
            CatalogMatch::Prefix => has_prefix(catalog, operation),
        };

        if known {
            Ok(())
        } else {
            warn!("Refusing operation outside the catalog: {}", operation);
            Err(ResolveError::UnknownOperation(operation.clone()))
        }
    }
}

fn has_prefix(catalog: &CatalogSnapshot, prefix: &OperationId) -> bool {
    // Path segments never contain characters below ' ', so `prefix` and its
    // descendants sort contiguously right after it.
    match catalog.operations.range(prefix.clone()..).next() {
        Some(first) => {
            first == prefix
                || first
                    .as_str()
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with(' '))
        }
        None => false,
    }
}
