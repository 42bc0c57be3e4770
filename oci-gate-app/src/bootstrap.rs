use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use oci_gate_core::{CatalogSnapshot, PolicyList};
use oci_gate_executor::{CommandExecutor, HelpCatalogSource, ProcessExecutor};
use oci_gate_policy::{PolicyError, PolicyGenerator, PolicyStore, VerbMatcher};
use oci_gate_tools::{
    AuditLogger, CommandResolver, DispatchGateway, JsonlAuditLogger, NoopAuditLogger, Redactor,
    ResolverOptions, ToolRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Executor for dispatched commands: `<cli> --profile <p> --auth <a> ...`.
pub fn gateway_executor(config: &GatewayConfig) -> ProcessExecutor {
    let mut executor = base_executor(config).with_global_args([
        "--profile".to_string(),
        config.profile.clone(),
        "--auth".to_string(),
        config.auth.clone(),
    ]);
    if let Some(tenancy) = &config.tenancy {
        executor = executor.with_env("OCI_CLI_TENANCY", tenancy.clone());
    }
    executor
}

/// Executor for `--version` and `--help` probes; no credentials involved.
pub fn help_executor(config: &GatewayConfig) -> ProcessExecutor {
    base_executor(config)
}

fn base_executor(config: &GatewayConfig) -> ProcessExecutor {
    ProcessExecutor::new(&config.cli)
        .with_env("OCI_SDK_APPEND_USER_AGENT", config.user_agent.clone())
        .with_limits(config.limits)
        .with_max_output_bytes(config.max_output_bytes)
}

pub fn policy_store(config: &GatewayConfig) -> PolicyStore {
    PolicyStore::new(&config.policy_dir)
}

pub fn policy_generator(config: &GatewayConfig) -> PolicyGenerator {
    let matcher = VerbMatcher::new(&config.denied_verbs, config.verb_match);
    PolicyGenerator::new(matcher, policy_store(config))
}

pub fn catalog_source(config: &GatewayConfig, executor: Arc<dyn CommandExecutor>) -> HelpCatalogSource {
    HelpCatalogSource::new(executor)
        .with_concurrency(config.catalog_concurrency)
        .with_help_timeout(Duration::from_millis(config.help_timeout_ms))
}

/// Reads the current deny list once. A missing list is fatal unless
/// `allow_missing_denylist` is set.
pub async fn load_policy(config: &GatewayConfig) -> Result<PolicyList> {
    let store = policy_store(config);
    match store.load_current().await {
        Ok(policy) => Ok(policy),
        Err(PolicyError::NotFound(path)) if config.allow_missing_denylist => {
            warn!(
                "Denylist file {} not found, no commands will be blocked",
                path.display()
            );
            Ok(PolicyList::empty())
        }
        Err(PolicyError::NotFound(path)) => anyhow::bail!(
            "No denylist at {}. Run `oci-gate generate-denylist` first",
            path.display()
        ),
        Err(e) => Err(e).context("Failed to load denylist"),
    }
}

/// The catalog snapshot matching the deny list's CLI version, if one was saved.
pub async fn load_catalog(config: &GatewayConfig, policy: &PolicyList) -> Result<Option<CatalogSnapshot>> {
    if policy.version.is_empty() {
        return Ok(None);
    }
    let snapshot = policy_store(config)
        .load_snapshot(&policy.version)
        .await
        .context("Failed to load catalog snapshot")?;

    if let Some(snapshot) = &snapshot {
        if !policy.is_subset_of(snapshot) {
            warn!(
                "Denylist contains commands missing from the {} catalog snapshot",
                snapshot.version
            );
        }
    }
    Ok(snapshot)
}

/// Like [`load_catalog`], but a missing snapshot is fatal unless
/// `allow_missing_catalog` is set.
pub async fn require_catalog(config: &GatewayConfig, policy: &PolicyList) -> Result<Option<CatalogSnapshot>> {
    match load_catalog(config, policy).await? {
        Some(snapshot) => Ok(Some(snapshot)),
        None if config.allow_missing_catalog => {
            warn!("No catalog snapshot loaded, operations will not be checked against the catalog");
            Ok(None)
        }
        None => anyhow::bail!(
            "No catalog snapshot for CLI version {:?} in {}. Run `oci-gate generate-denylist` first",
            policy.version,
            config.policy_dir.display()
        ),
    }
}

pub fn audit_logger(config: &GatewayConfig) -> Result<Arc<dyn AuditLogger>> {
    match &config.audit_log {
        Some(path) => {
            let logger = JsonlAuditLogger::with_max_bytes(path, config.audit_max_bytes)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?;
            Ok(Arc::new(logger))
        }
        None => Ok(Arc::new(NoopAuditLogger)),
    }
}

/// Assembles a gateway around an already-loaded policy.
pub fn assemble_gateway(
    config: &GatewayConfig,
    policy: PolicyList,
    catalog: Option<CatalogSnapshot>,
    executor: Arc<dyn CommandExecutor>,
    audit: Arc<dyn AuditLogger>,
) -> DispatchGateway {
    let mut resolver = CommandResolver::new(Arc::new(ToolRegistry::with_defaults())).with_options(
        ResolverOptions {
            allow_file_arguments: config.allow_file_arguments,
            allow_uncataloged: config.allow_missing_catalog,
        },
    );
    if let Some(catalog) = catalog {
        resolver = resolver.with_catalog(Arc::new(catalog));
    }

    DispatchGateway::new(
        resolver,
        Arc::new(policy),
        executor,
        audit,
        config.timeout_ms,
    )
    .with_redactor(Redactor::new(config.max_diagnostic_bytes))
}

pub async fn build_gateway(config: &GatewayConfig) -> Result<DispatchGateway> {
    let policy = load_policy(config).await?;
    let catalog = require_catalog(config, &policy).await?;
    info!(
        "Gateway ready: {} denied commands (CLI version {:?}), catalog {}",
        policy.len(),
        policy.version,
        match &catalog {
            Some(c) => format!("with {} commands", c.len()),
            None => "not loaded".to_string(),
        }
    );

    Ok(assemble_gateway(
        config,
        policy,
        catalog,
        Arc::new(gateway_executor(config)),
        audit_logger(config)?,
    ))
}
