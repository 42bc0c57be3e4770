use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::{Context, Result};
use std::sync::Arc;

pub async fn run(config: &GatewayConfig) -> Result<()> {
    let source = bootstrap::catalog_source(config, Arc::new(bootstrap::help_executor(config)));
    let generator = bootstrap::policy_generator(config);

    let report = generator
        .generate(&source)
        .await
        .context("Failed to generate denylist")?;

    if report.snapshot_reused {
        println!("Reused command catalog for OCI CLI {}", report.policy.version);
    }
    if let Some(backup) = &report.backup {
        println!("Previous denylist archived to {}", backup.display());
    }
    println!(
        "{} commands will be denied out of {} commands",
        report.denied(),
        report.total
    );
    println!(
        "Denylist written to {}",
        generator.store().current_path().display()
    );
    Ok(())
}
