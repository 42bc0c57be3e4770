use anyhow::{Context, Result};
use oci_gate_app::commands;
use oci_gate_app::config::GatewayConfig;
use std::path::PathBuf;
use std::process::ExitCode;

const USAGE: &str = "\
Usage: oci-gate [--config <file>] <command> [args...]

Commands:
  generate-denylist   Derive the denylist from the installed OCI CLI
  run <command...>    Run an OCI CLI command through the gateway
  help <command...>   Show OCI CLI help for a command or group
  commands            List OCI CLI services
  serve               Answer JSON tool calls on stdin, one per line
  health              Check the CLI, denylist and audit log
";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let mut args: Vec<String> = std::env::args().skip(1).collect();

    let mut config_path = None;
    if args.first().map(String::as_str) == Some("--config") {
        if args.len() < 2 {
            anyhow::bail!("--config requires a path\n\n{}", USAGE);
        }
        config_path = Some(PathBuf::from(args.remove(1)));
        args.remove(0);
    }

    let Some(command) = args.first().cloned() else {
        eprint!("{}", USAGE);
        return Ok(ExitCode::FAILURE);
    };
    let rest = &args[1..];

    if matches!(command.as_str(), "-h" | "--help") {
        print!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let config = GatewayConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.log_level)?;

    match command.as_str() {
        "generate-denylist" => {
            commands::generate::run(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        "run" => {
            require_args(rest, "run")?;
            commands::run::run(&config, rest).await
        }
        "help" => {
            require_args(rest, "help")?;
            commands::help::run(&config, rest).await
        }
        "commands" => commands::services::run(&config).await,
        "serve" => {
            commands::serve::run(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        "health" => {
            commands::health::run(&config).await?;
            Ok(ExitCode::SUCCESS)
        }
        other => {
            eprintln!("Unknown command: {}\n", other);
            eprint!("{}", USAGE);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn require_args(rest: &[String], command: &str) -> Result<()> {
    if rest.is_empty() {
        anyhow::bail!("`{}` needs an OCI CLI command, e.g. `oci-gate {} os ns get`", command, command);
    }
    Ok(())
}

/// Logs go to stderr; stdout carries envelopes only.
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level {:?}", level))?;

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    Ok(())
}
