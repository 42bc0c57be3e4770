use crate::bootstrap;
use crate::config::GatewayConfig;
use anyhow::Result;
use oci_gate_core::{ErrorKind, InvocationRequest, ResultEnvelope};
use oci_gate_tools::{DispatchGateway, Redactor};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{info, warn};

pub async fn run(config: &GatewayConfig) -> Result<()> {
    let gateway = bootstrap::build_gateway(config).await?;
    info!("Serving tools: {}", gateway_tool_names(&gateway).join(", "));
    serve(&gateway, tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

fn gateway_tool_names(gateway: &DispatchGateway) -> Vec<String> {
    gateway
        .list_tools()
        .iter()
        .filter_map(|t| t["name"].as_str().map(str::to_string))
        .collect()
}

/// One JSON request per input line, one envelope per output line, in order.
/// Returns the number of requests answered when the input closes.
pub async fn serve<R, W>(gateway: &DispatchGateway, input: R, mut output: W) -> Result<usize>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let redactor = Redactor::default();
    let mut lines = BufReader::new(input).lines();
    let mut answered = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match serde_json::from_str::<InvocationRequest>(&line) {
            Ok(request) => gateway.dispatch(request).await,
            Err(e) => {
                warn!("Rejected malformed request: {}", e);
                ResultEnvelope::failed(
                    ErrorKind::ResolutionError,
                    format!("invalid request: {}", redactor.sanitize(&e.to_string())),
                )
            }
        };

        let mut encoded = serde_json::to_vec(&envelope)?;
        encoded.push(b'\n');
        output.write_all(&encoded).await?;
        output.flush().await?;
        answered += 1;
    }

    let stats = gateway.metrics().snapshot();
    info!(
        "Input closed after {} requests: {} executed, {} denied, {:.1}% of executions succeeded",
        answered,
        stats.executions,
        stats.denials,
        stats.success_rate() * 100.0
    );
    Ok(answered)
}
