use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::Result;
use chrono::Utc;
use oci_gate_executor::HelpCatalogSource;
use oci_gate_policy::{CatalogSource, STALE_LOCK_SECS};
use std::sync::Arc;

pub async fn run(config: &GatewayConfig) -> Result<()> {
    println!("oci-gate health check\n");
    let mut healthy = true;

    print!("OCI CLI ({})... ", config.cli.display());
    let source = HelpCatalogSource::new(Arc::new(bootstrap::help_executor(config)));
    let installed = match source.version().await {
        Ok(version) => {
            println!("✓ {}", version);
            Some(version)
        }
        Err(e) => {
            println!("✗ ({})", e);
            healthy = false;
            None
        }
    };

    print!("Policy directory {}... ", config.policy_dir.display());
    if config.policy_dir.is_dir() {
        println!("✓");
    } else {
        println!("✗ (not found)");
        healthy = false;
    }

    print!("Policy store lock... ");
    match bootstrap::policy_store(config).lock_holder().await {
        Ok(None) => println!("✓ free"),
        Ok(Some(holder)) => {
            let pid = holder.pid.map_or_else(|| "unknown".to_string(), |p| p.to_string());
            if holder.is_stale(Utc::now(), chrono::Duration::seconds(STALE_LOCK_SECS)) {
                println!(
                    "✗ stale lock from pid {}; remove {} to regenerate",
                    pid,
                    holder.path.display()
                );
                healthy = false;
            } else {
                println!("- held by pid {} (generation in progress)", pid);
            }
        }
        Err(e) => {
            println!("✗ ({})", e);
            healthy = false;
        }
    }

    print!("Denylist... ");
    match bootstrap::load_policy(config).await {
        Ok(policy) => {
            println!("✓ {} denied commands (version {:?})", policy.len(), policy.version);
            if let Some(installed) = &installed {
                if !policy.version.is_empty() && &policy.version != installed {
                    println!("  ! generated for {}, installed CLI is {}; regenerate it", policy.version, installed);
                }
            }

            if !policy.version.is_empty() {
                print!("Versioned denylist {}... ", policy.version);
                match bootstrap::policy_store(config).load_versioned(&policy.version).await {
                    Ok(versioned) if versioned.denied == policy.denied => println!("✓"),
                    Ok(_) => println!("! differs from the current denylist; regenerate it"),
                    Err(e) => println!("! ({})", e),
                }
            }

            print!("Catalog snapshot... ");
            match bootstrap::load_catalog(config, &policy).await {
                Ok(Some(catalog)) => println!("✓ {} commands", catalog.len()),
                Ok(None) if config.allow_missing_catalog => {
                    println!("- (missing, unknown commands are not rejected before execution)")
                }
                Ok(None) => {
                    println!("✗ (missing, the gateway will not start)");
                    healthy = false;
                }
                Err(e) => {
                    println!("✗ ({:#})", e);
                    healthy = false;
                }
            }
        }
        Err(e) => {
            println!("✗ ({:#})", e);
            healthy = false;
        }
    }

    print!("Audit log... ");
    match &config.audit_log {
        None => println!("- (disabled)"),
        Some(path) => match bootstrap::audit_logger(config) {
            Ok(_) => println!("✓ {}", path.display()),
            Err(e) => {
                println!("✗ ({:#})", e);
                healthy = false;
            }
        },
    }

    println!();
    if healthy {
        println!("All checks passed");
        Ok(())
    } else {
        anyhow::bail!("Health check failed");
    }
}
