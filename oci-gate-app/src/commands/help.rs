use super::{exit_code, print_envelope};
use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::Result;
use oci_gate_core::InvocationRequest;
use serde_json::Value;
use std::process::ExitCode;

pub async fn run(config: &GatewayConfig, command: &[String]) -> Result<ExitCode> {
    let gateway = bootstrap::build_gateway(config).await?;
    let request =
        InvocationRequest::new("get_oci_command_help").with_arg("command", command.join(" "));

    let envelope = gateway.dispatch(request).await;
    match &envelope.payload {
        Some(Value::String(text)) => print!("{}", text),
        _ => print_envelope(&envelope)?,
    }
    Ok(exit_code(&envelope))
}
