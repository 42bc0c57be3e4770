use crate::error::ResolveError;
use crate::resolver::ResolvedCommand;
use serde_json::Value;
use std::collections::BTreeMap;

/// A named tool exposed to callers. Tools only map arguments to an
/// invocation; running it is the gateway's job.
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn schema(&self) -> Value;

    fn resolve(&self, arguments: &BTreeMap<String, Value>) -> Result<ResolvedCommand, ResolveError>;

    /// Shapes successful stdout into the envelope payload.
    fn payload(&self, stdout: String) -> Value {
        json_or_text(stdout)
    }
}

/// Structured JSON when the CLI printed JSON, raw text otherwise.
pub fn json_or_text(stdout: String) -> Value {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => value,
        Err(_) => Value::String(stdout),
    }
}

pub(crate) fn required_command<'a>(arguments: &'a BTreeMap<String, Value>) -> Result<&'a str, ResolveError> {
    match arguments.get("command") {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ResolveError::InvalidArgument {
            name: "command".into(),
            reason: "expected a string".into(),
        }),
        None => Err(ResolveError::MissingArgument("command")),
    }
}
