use super::{exit_code, print_envelope};
use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::Result;
use oci_gate_core::InvocationRequest;
use std::process::ExitCode;

/// Runs one command through the gateway and prints the envelope.
pub async fn run(config: &GatewayConfig, command: &[String]) -> Result<ExitCode> {
    let gateway = bootstrap::build_gateway(config).await?;
    let request = InvocationRequest::new("run_oci_command").with_arg("command", command.join(" "));

    let envelope = gateway.dispatch(request).await;
    print_envelope(&envelope)?;
    Ok(exit_code(&envelope))
}
