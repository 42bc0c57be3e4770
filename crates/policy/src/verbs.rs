use oci_gate_core::OperationId;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DENIED_VERBS: &[&str] = &[
    "delete",
    "terminate",
    "put",
    "update",
    "replace",
    "remove",
    "patch",
];

/// How a command's terminal segment is compared against the verb set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerbMatch {
    /// Terminal segment equals a verb: `update`.
    Segment,
    /// First hyphen-separated word of the terminal segment equals a verb:
    /// `update`, `update-vnic`, but not `updates` or `replacement-policy-get`.
    #[default]
    LeadingWord,
    /// Terminal segment starts with a verb. Over-blocks `updates`, `putaway`, ...
    Prefix,
}

#[derive(Debug, Clone)]
pub struct VerbMatcher {
    verbs: Vec<String>,
    mode: VerbMatch,
}

impl VerbMatcher {
    pub fn new<I, S>(verbs: I, mode: VerbMatch) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut verbs: Vec<String> = verbs
            .into_iter()
            .map(|v| v.as_ref().trim().to_lowercase())
            .filter(|v| !v.is_empty())
            .collect();
        verbs.sort();
        verbs.dedup();
        Self { verbs, mode }
    }

    pub fn with_extra_verbs<I, S>(self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mode = self.mode;
        let all = self
            .verbs
            .into_iter()
            .chain(extra.into_iter().map(|v| v.as_ref().to_string()));
        Self::new(all, mode)
    }

    pub fn verbs(&self) -> &[String] {
        &self.verbs
    }

    pub fn mode(&self) -> VerbMatch {
        self.mode
    }

    /// Returns the verb that classifies `id` as mutating, if any.
    pub fn matched_verb(&self, id: &OperationId) -> Option<&str> {
        let terminal = id.terminal();
        self.verbs
            .iter()
            .find(|verb| self.segment_matches(terminal, verb))
            .map(String::as_str)
    }

    pub fn is_mutating(&self, id: &OperationId) -> bool {
        self.matched_verb(id).is_some()
    }

    fn segment_matches(&self, terminal: &str, verb: &str) -> bool {
        match self.mode {
            VerbMatch::Segment => terminal == verb,
            VerbMatch::LeadingWord => terminal.split('-').next() == Some(verb),
            VerbMatch::Prefix => terminal.starts_with(verb),
        }
    }
}

impl Default for VerbMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_DENIED_VERBS, VerbMatch::default())
    }
}
