use crate::audit::AuditLogger;
use crate::redact::Redactor;
use crate::resolver::{CommandResolver, Resolution};
use crate::tools::Tool;
use oci_gate_core::{
    DispatchState, ErrorKind, GatewayMetrics, InvocationRequest, OperationId, PolicyList,
    ResultEnvelope,
};
use oci_gate_executor::{CommandExecutor, ExecOutput, ExecutorError};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Tracks one invocation through its states.
struct Lifecycle {
    id: Uuid,
    state: DispatchState,
}

impl Lifecycle {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            state: DispatchState::Received,
        }
    }

    fn advance(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {:?} -> {:?}",
            self.state,
            next
        );
        debug!("Invocation {}: {:?} -> {:?}", self.id, self.state, next);
        self.state = next;
    }
}

/// Policy-gated front door to the CLI. Every call goes resolve, policy
/// check, execute once, normalize. Every call yields an envelope and one
/// audit record.
pub struct DispatchGateway {
    resolver: CommandResolver,
    policy: Arc<PolicyList>,
    executor: Arc<dyn CommandExecutor>,
    audit: Arc<dyn AuditLogger>,
    metrics: Arc<GatewayMetrics>,
    redactor: Redactor,
    timeout_ms: u64,
}

impl DispatchGateway {
    pub fn new(
        resolver: CommandResolver,
        policy: Arc<PolicyList>,
        executor: Arc<dyn CommandExecutor>,
        audit: Arc<dyn AuditLogger>,
        timeout_ms: u64,
    ) -> Self {
        if !resolver.has_catalog() {
            if resolver.options().allow_uncataloged {
                warn!("No catalog snapshot loaded; unknown operations cannot be rejected before execution");
            } else {
                warn!("No catalog snapshot loaded; every run and help request will be refused");
            }
        }
        Self {
            resolver,
            policy,
            executor,
            audit,
            metrics: GatewayMetrics::new(),
            redactor: Redactor::default(),
            timeout_ms,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GatewayMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }

    pub fn policy(&self) -> &PolicyList {
        &self.policy
    }

    pub fn metrics(&self) -> &GatewayMetrics {
        &self.metrics
    }

    /// Descriptions of the exposed tools.
    pub fn list_tools(&self) -> Vec<serde_json::Value> {
        self.resolver.registry().schemas()
    }

    pub async fn dispatch(&self, request: InvocationRequest) -> ResultEnvelope {
        let started = Instant::now();
        let mut lifecycle = Lifecycle::new(Uuid::new_v4());
        self.metrics.inc_dispatches();
        info!("Dispatching {} ({})", request.tool_name, lifecycle.id);

        let (operation, envelope) = match self.resolver.resolve(&request) {
            Err(e) => {
                warn!("Resolution failed for {}: {}", request.tool_name, e);
                lifecycle.advance(DispatchState::Failed);
                (None, ResultEnvelope::failed(ErrorKind::ResolutionError, e.to_string()))
            }
            Ok(resolution) => {
                lifecycle.advance(DispatchState::Resolved);
                let operation = resolution.command.operation.clone();
                let envelope = self.gate_and_execute(resolution, &mut lifecycle).await;
                (operation, envelope)
            }
        };

        self.metrics.record(&envelope);
        self.audit_record(&lifecycle, &request, operation.as_ref(), &envelope, started)
            .await;
        envelope
    }

    async fn gate_and_execute(
        &self,
        resolution: Resolution,
        lifecycle: &mut Lifecycle,
    ) -> ResultEnvelope {
        let Resolution { tool, command } = resolution;

        if command.policy_gated {
            if let Some(operation) = &command.operation {
                if self.policy.contains(operation) {
                    warn!("Denied mutating operation: {}", operation);
                    lifecycle.advance(DispatchState::Denied);
                    return ResultEnvelope::denied(operation.clone());
                }
            }
        }

        lifecycle.advance(DispatchState::Executing);
        self.metrics.inc_executions();

        let envelope = match self.execute_with_protection(command.args).await {
            Ok(output) => self.normalize(tool.as_ref(), output),
            Err(envelope) => envelope,
        };
        lifecycle.advance(if envelope.is_success() {
            DispatchState::Succeeded
        } else {
            DispatchState::Failed
        });

        match command.operation {
            Some(operation) if !envelope.is_success() => envelope.with_operation(operation),
            _ => envelope,
        }
    }

    /// Runs the executor once on its own task, bounded by `timeout_ms`.
    ///
    /// On timeout the task is aborted; the process executor's child is
    /// killed when its future drops. Executors that ignore cancellation may
    /// keep running after the envelope is returned.
    async fn execute_with_protection(&self, args: Vec<String>) -> Result<ExecOutput, ResultEnvelope> {
        let executor = self.executor.clone();
        let mut handle = tokio::spawn(async move { executor.execute(args).await });

        match timeout(Duration::from_millis(self.timeout_ms), &mut handle).await {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(ExecutorError::NotFound(program)))) => {
                error!("CLI not found: {}", program);
                Err(ResultEnvelope::failed(
                    ErrorKind::ToolUnavailable,
                    format!("external tool is not available: {}", self.redactor.sanitize(&program)),
                ))
            }
            Ok(Ok(Err(e))) => {
                error!("Executor failed: {}", e);
                Err(ResultEnvelope::failed(
                    ErrorKind::ExecutionError,
                    self.redactor.sanitize(&e.to_string()),
                ))
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    error!("Executor panicked");
                } else {
                    error!("Executor task cancelled");
                }
                Err(ResultEnvelope::failed(
                    ErrorKind::ExecutionError,
                    "executor terminated abnormally",
                ))
            }
            Err(_) => {
                handle.abort();
                warn!("Execution timed out after {}ms", self.timeout_ms);
                Err(ResultEnvelope::failed(
                    ErrorKind::Timeout,
                    format!("timed out after {}ms", self.timeout_ms),
                ))
            }
        }
    }

    fn normalize(&self, tool: &dyn Tool, output: ExecOutput) -> ResultEnvelope {
        if output.truncated {
            warn!("CLI output exceeded the capture limit and was truncated");
        }

        if output.is_success() {
            return ResultEnvelope::success(tool.payload(output.stdout));
        }

        let diagnostic = if output.stderr.trim().is_empty() {
            &output.stdout
        } else {
            &output.stderr
        };
        let mut message = self.redactor.sanitize(diagnostic);
        if message.is_empty() {
            message = match output.exit_code {
                Some(code) => format!("command exited with status {}", code),
                None => "command terminated by signal".to_string(),
            };
        }

        ResultEnvelope::failed(ErrorKind::ExecutionError, message).with_exit_code(output.exit_code)
    }

    async fn audit_record(
        &self,
        lifecycle: &Lifecycle,
        request: &InvocationRequest,
        operation: Option<&OperationId>,
        envelope: &ResultEnvelope,
        started: Instant,
    ) {
        let entry = json!({
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "invocation_id": lifecycle.id.to_string(),
            "tool": request.tool_name,
            "operation": operation.map(OperationId::as_str),
            "state": lifecycle.state,
            "status": envelope.status,
            "error_kind": envelope.error_kind(),
            "exit_code": envelope.error.as_ref().and_then(|e| e.exit_code),
            "duration_ms": started.elapsed().as_millis() as u64,
        });
        self.audit.log(entry).await;
    }
}
