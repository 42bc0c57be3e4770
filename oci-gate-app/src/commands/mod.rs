pub mod generate;
pub mod health;
pub mod help;
pub mod run;
pub mod serve;
pub mod services;

use oci_gate_core::{ResultEnvelope, Status};
use std::process::ExitCode;

/// 0 for success, 2 for a denied operation, 1 for any other failure.
pub fn exit_code(envelope: &ResultEnvelope) -> ExitCode {
    match envelope.status {
        Status::Success => ExitCode::SUCCESS,
        Status::Denied => ExitCode::from(2),
        Status::Failed => ExitCode::FAILURE,
    }
}

pub(crate) fn print_envelope(envelope: &ResultEnvelope) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(())
}
