use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OperationIdError {
    #[error("Operation identifier is empty")]
    Empty,
    #[error("Invalid path segment: {0:?}")]
    InvalidSegment(String),
}

/// Canonical, space-joined command path in the CLI's namespace,
/// e.g. `compute instance terminate`.
///
/// Segments are stored lowercased so that lookups are case-insensitive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OperationId(String);

impl OperationId {
    pub fn from_segments<I, S>(segments: I) -> Result<Self, OperationIdError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut parts = Vec::new();
        for segment in segments {
            let segment = segment.as_ref();
            if !Self::is_valid_segment(segment) {
                return Err(OperationIdError::InvalidSegment(segment.to_string()));
            }
            parts.push(segment.to_lowercase());
        }

        if parts.is_empty() {
            return Err(OperationIdError::Empty);
        }

        Ok(Self(parts.join(" ")))
    }

    fn is_valid_segment(segment: &str) -> bool {
        !segment.is_empty()
            && !segment.starts_with('-')
            && !segment
                .chars()
                .any(|c| c.is_whitespace() || c.is_control())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(' ')
    }

    /// Last path segment, the command's verb for leaf commands.
    pub fn terminal(&self) -> &str {
        self.0.rsplit(' ').next().unwrap_or(&self.0)
    }

    pub fn depth(&self) -> usize {
        self.segments().count()
    }
}

impl FromStr for OperationId {
    type Err = OperationIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_segments(s.split_whitespace())
    }
}

impl TryFrom<String> for OperationId {
    type Error = OperationIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OperationId> for String {
    fn from(id: OperationId) -> Self {
        id.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Every leaf command exposed by one version of the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub version: String,
    pub operations: BTreeSet<OperationId>,
}

impl CatalogSnapshot {
    pub fn new(version: impl Into<String>, operations: impl IntoIterator<Item = OperationId>) -> Self {
        Self {
            version: version.into(),
            operations: operations.into_iter().collect(),
        }
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.operations.contains(id)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Operations refused by the gateway, keyed to the CLI version they were derived from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyList {
    pub version: String,
    pub denied: BTreeSet<OperationId>,
}

impl PolicyList {
    pub fn new(version: impl Into<String>, denied: impl IntoIterator<Item = OperationId>) -> Self {
        Self {
            version: version.into(),
            denied: denied.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.denied.contains(id)
    }

    pub fn len(&self) -> usize {
        self.denied.len()
    }

    pub fn is_empty(&self) -> bool {
        self.denied.is_empty()
    }

    pub fn is_subset_of(&self, snapshot: &CatalogSnapshot) -> bool {
        self.denied.is_subset(&snapshot.operations)
    }
}

/// A single tool call as received from the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationRequest {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, serde_json::Value>,
}

impl InvocationRequest {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_normalizes_whitespace_and_case() {
        let id: OperationId = "  Compute   Instance LIST ".parse().unwrap();
        assert_eq!(id.as_str(), "compute instance list");
        assert_eq!(id.terminal(), "list");
        assert_eq!(id.depth(), 3);
    }

    #[test]
    fn test_operation_id_rejects_flags_and_empty() {
        assert_eq!("".parse::<OperationId>(), Err(OperationIdError::Empty));
        assert!(matches!(
            OperationId::from_segments(["compute", "--all"]),
            Err(OperationIdError::InvalidSegment(_))
        ));
        assert!(matches!(
            OperationId::from_segments(["compute", "inst\0ance"]),
            Err(OperationIdError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_operation_id_serde_as_string() {
        let id: OperationId = "os bucket list".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"os bucket list\"");
        let back: OperationId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<OperationId>("\"\"").is_err());
    }

    #[test]
    fn test_policy_subset_of_snapshot() {
        let snapshot = CatalogSnapshot::new(
            "3.50.0",
            ["compute instance list", "compute instance terminate"]
                .iter()
                .map(|s| s.parse().unwrap()),
        );
        let policy = PolicyList::new("3.50.0", ["compute instance terminate".parse().unwrap()]);
        assert!(policy.is_subset_of(&snapshot));

        let stray = PolicyList::new("3.50.0", ["network vcn delete".parse().unwrap()]);
        assert!(!stray.is_subset_of(&snapshot));
    }

    #[test]
    fn test_invocation_request_deserializes_without_arguments() {
        let req: InvocationRequest = serde_json::from_str(r#"{"tool_name": "get_oci_commands"}"#).unwrap();
        assert_eq!(req.tool_name, "get_oci_commands");
        assert!(req.arguments.is_empty());
    }
}
