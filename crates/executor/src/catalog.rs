//! Command catalog discovery by walking the CLI's own `--help` output.

use crate::command_executor::{CommandExecutor, ExecutorError};
use async_trait::async_trait;
use oci_gate_core::OperationId;
use oci_gate_policy::{CatalogSource, PolicyError};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{debug, info};

const DEFAULT_CONCURRENCY: usize = 8;
const DEFAULT_MAX_DEPTH: usize = 8;
const DEFAULT_HELP_TIMEOUT: Duration = Duration::from_secs(60);

static COMMAND_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^( +)([a-z0-9][a-z0-9-]*)(?:\s|$)").expect("static regex")
});

/// Extracts the sub-command names listed under a `Commands:` heading.
///
/// The first entry fixes the entry indent. The root page indents services
/// deeper than group pages indent sub-commands. Lines indented further are
/// wrapped descriptions, and the section ends at the next unindented heading.
pub fn parse_help_commands(help: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut in_commands = false;
    let mut entry_indent: Option<usize> = None;

    for line in help.lines() {
        if !in_commands {
            if line.trim_start().starts_with("Commands:") {
                in_commands = true;
            }
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }
        if !line.starts_with(' ') {
            break;
        }
        let Some(caps) = COMMAND_LINE.captures(line) else {
            continue;
        };
        let indent = caps[1].len();
        if *entry_indent.get_or_insert(indent) == indent {
            commands.push(caps[2].to_string());
        }
    }

    commands
}

pub struct HelpCatalogSource {
    executor: Arc<dyn CommandExecutor>,
    concurrency: usize,
    max_depth: usize,
    help_timeout: Duration,
}

impl HelpCatalogSource {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            concurrency: DEFAULT_CONCURRENCY,
            max_depth: DEFAULT_MAX_DEPTH,
            help_timeout: DEFAULT_HELP_TIMEOUT,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth.max(1);
        self
    }

    pub fn with_help_timeout(mut self, help_timeout: Duration) -> Self {
        self.help_timeout = help_timeout;
        self
    }

    async fn run(&self, args: Vec<String>) -> Result<String, PolicyError> {
        help_output(self.executor.clone(), args, self.help_timeout).await
    }
}

async fn help_output(
    executor: Arc<dyn CommandExecutor>,
    args: Vec<String>,
    limit: Duration,
) -> Result<String, PolicyError> {
    let rendered = args.join(" ");
    let output = timeout(limit, executor.execute(args))
        .await
        .map_err(|_| PolicyError::ToolUnavailable(format!("`{}` timed out", rendered)))?
        .map_err(|e| match e {
            ExecutorError::NotFound(p) => PolicyError::ToolUnavailable(format!("{} is not installed", p)),
            other => PolicyError::ToolUnavailable(other.to_string()),
        })?;

    if !output.is_success() {
        return Err(PolicyError::ToolUnavailable(format!(
            "`{}` exited with {:?}",
            rendered, output.exit_code
        )));
    }
    Ok(output.stdout)
}

#[async_trait]
impl CatalogSource for HelpCatalogSource {
    async fn version(&self) -> Result<String, PolicyError> {
        let out = self
            .run(vec!["--version".into(), "--raw-output".into()])
            .await?;
        let version = out.trim().to_string();
        if version.is_empty() {
            return Err(PolicyError::ToolUnavailable("empty --version output".into()));
        }
        Ok(version)
    }

    async fn enumerate(&self) -> Result<BTreeSet<OperationId>, PolicyError> {
        let root = self.run(vec!["--help".into()]).await?;
        let services = parse_help_commands(&root);
        info!("Found {} services", services.len());

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut leaves = BTreeSet::new();
        let mut frontier: Vec<Vec<String>> = services.into_iter().map(|s| vec![s]).collect();
        let mut depth = 1;

        while !frontier.is_empty() {
            let mut tasks = JoinSet::new();
            for path in frontier.drain(..) {
                let executor = self.executor.clone();
                let semaphore = semaphore.clone();
                let limit = self.help_timeout;
                tasks.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|e| PolicyError::ToolUnavailable(e.to_string()))?;
                    let mut args = path.clone();
                    args.push("--help".into());
                    let help = help_output(executor, args, limit).await?;
                    Ok::<_, PolicyError>((path, parse_help_commands(&help)))
                });
            }

            let mut next = Vec::new();
            while let Some(joined) = tasks.join_next().await {
                let (path, children) = joined
                    .map_err(|e| PolicyError::ToolUnavailable(format!("help task failed: {}", e)))??;

                if children.is_empty() || depth >= self.max_depth {
                    debug!("Leaf command: {}", path.join(" "));
                    let id = OperationId::from_segments(&path).map_err(|e| {
                        PolicyError::ToolUnavailable(format!("bad command path {:?}: {}", path, e))
                    })?;
                    leaves.insert(id);
                } else {
                    for child in children {
                        let mut sub = path.clone();
                        sub.push(child);
                        next.push(sub);
                    }
                }
            }

            frontier = next;
            depth += 1;
        }

        info!("Enumerated {} leaf commands", leaves.len());
        Ok(leaves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT_HELP: &str = "\
Usage: oci [OPTIONS] COMMAND [ARGS]...

  Oracle Cloud Infrastructure command line interface.

Options:
  -v, --version    Show the version and exit.
  --profile TEXT   The profile in the config file.

Commands:
  compute          Compute Service CLI
  network          Networking Service CLI
                   with a long wrapped description
  os               Object Storage Service
";

    #[test]
    fn test_parse_root_help() {
        assert_eq!(parse_help_commands(ROOT_HELP), vec!["compute", "network", "os"]);
    }

    /// Layout of `oci --help` from a 3.x install, trimmed.
    const INSTALLED_ROOT_HELP: &str = "\
Usage: oci [OPTIONS] COMMAND [ARGS]...

  Oracle Cloud Infrastructure command line interface, with support for
  Audit, Block Volume, Compute, Database, IAM, Load Balancing, Networking,
  DNS, File Storage, Email Delivery and Object Storage Services.

  Most commands must specify a service, followed by a resource type and then
  an action. For example, to list users (where $T contains the OCID of the
  current tenant):

    oci iam user list --compartment-id $T

  Output is in JSON format.

Options:
  -v, --version                   Show the version and exit.
  --config-file TEXT              The path to the config file.  [default:
                                  ~/.oci/config]
  --profile TEXT                  The profile in the config file to load.
                                  This profile will also be used to locate
                                  any default parameter values which have
                                  been specified in the OCI CLI-specific
                                  configuration file.  [default: DEFAULT]
  --raw-output                    If the output of a given query is a single
                                  string value, this will return the string
                                  without surrounding quotes
  -?, -h, --help                  For detailed help on the individual OCI CLI
                                  command, enter <command> --help.

Commands:
    access-governance-cp            Access Governance Cp
    adm                             Application Dependency Management (ADM)
                                    Control Plane API
    ai                              OCI Language
    ai-vision                       Vision API
    compute                         Compute Service CLI
    iam                             Identity and Access Management Service
    os                              Object Storage Service
    setup                           Setup commands for CLI
";

    #[test]
    fn test_parse_installed_root_help() {
        assert_eq!(
            parse_help_commands(INSTALLED_ROOT_HELP),
            vec![
                "access-governance-cp",
                "adm",
                "ai",
                "ai-vision",
                "compute",
                "iam",
                "os",
                "setup",
            ]
        );
    }

    #[test]
    fn test_parse_leaf_help_has_no_commands() {
        let leaf = "Usage: oci compute instance list [OPTIONS]\n\nOptions:\n  --all  Fetch all pages\n";
        assert!(parse_help_commands(leaf).is_empty());
    }

    #[test]
    fn test_parse_stops_at_next_section() {
        let help = "Commands:\n  list  List things\n\nExamples:\n  get   not a command\n";
        assert_eq!(parse_help_commands(help), vec!["list"]);
    }
}
