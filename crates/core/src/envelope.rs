use crate::types::OperationId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Denied,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ToolUnavailable,
    ResolutionError,
    Denied,
    Timeout,
    ExecutionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::ToolUnavailable => "ToolUnavailable",
            ErrorKind::ResolutionError => "ResolutionError",
            ErrorKind::Denied => "Denied",
            ErrorKind::Timeout => "Timeout",
            ErrorKind::ExecutionError => "ExecutionError",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<OperationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

/// Uniform reply for one invocation. Exactly one of `payload` / `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDescriptor>,
}

pub const DENIAL_REASON: &str = "operation classified as mutating";

impl ResultEnvelope {
    pub fn success(payload: Value) -> Self {
        Self {
            status: Status::Success,
            payload: Some(payload),
            error: None,
        }
    }

    pub fn denied(operation: OperationId) -> Self {
        Self {
            status: Status::Denied,
            payload: None,
            error: Some(ErrorDescriptor {
                kind: ErrorKind::Denied,
                message: format!("{}: {}", DENIAL_REASON, operation),
                operation: Some(operation),
                exit_code: None,
            }),
        }
    }

    pub fn failed(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            status: Status::Failed,
            payload: None,
            error: Some(ErrorDescriptor {
                kind,
                message: message.into(),
                operation: None,
                exit_code: None,
            }),
        }
    }

    pub fn with_operation(mut self, operation: OperationId) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.operation = Some(operation);
        }
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        if let Some(error) = self.error.as_mut() {
            error.exit_code = code;
        }
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Lifecycle of a single dispatch. `Denied`, `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    Received,
    Resolved,
    Denied,
    Executing,
    Succeeded,
    Failed,
}

impl DispatchState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DispatchState::Denied | DispatchState::Succeeded | DispatchState::Failed
        )
    }

    pub fn can_transition_to(self, next: DispatchState) -> bool {
        use DispatchState::*;
        matches!(
            (self, next),
            (Received, Resolved)
                | (Received, Failed)
                | (Resolved, Denied)
                | (Resolved, Executing)
                | (Executing, Succeeded)
                | (Executing, Failed)
        )
    }
}
