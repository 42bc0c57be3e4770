use super::{exit_code, print_envelope};
use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::Result;
use oci_gate_core::InvocationRequest;
use serde_json::Value;
use std::process::ExitCode;

/// Prints the CLI's top-level service listing.
pub async fn run(config: &GatewayConfig) -> Result<ExitCode> {
    let gateway = bootstrap::build_gateway(config).await?;
    let envelope = gateway
        .dispatch(InvocationRequest::new("get_oci_commands"))
        .await;

    match &envelope.payload {
        Some(Value::String(text)) => print!("{}", text),
        _ => print_envelope(&envelope)?,
    }
    Ok(exit_code(&envelope))
}
