//! Scrubbing of CLI diagnostics before they leave the gateway.
//!
//! Failed OCI CLI calls often echo the request they attempted, including
//! signing headers, config paths and occasionally key material. Everything
//! returned to a caller in an error message goes through [`Redactor`].

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

const REDACTED: &str = "[REDACTED]";
const TRUNCATED_SUFFIX: &str = "...[truncated]";
pub const DEFAULT_MAX_DIAGNOSTIC_BYTES: usize = 4096;

struct Rule {
    regex: Regex,
    replacement: &'static str,
}

impl Rule {
    fn new(pattern: &str, replacement: &'static str) -> Self {
        Self {
            regex: Regex::new(pattern).expect("invalid redaction pattern"),
            replacement,
        }
    }
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        // PEM blocks, including ones cut off by truncation upstream
        Rule::new(
            r"(?s)-----BEGIN [A-Z ]*PRIVATE KEY-----.*?(?:-----END [A-Z ]*PRIVATE KEY-----|\z)",
            REDACTED,
        ),
        Rule::new(r"\beyJ[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]*", REDACTED),
        Rule::new(r"(?i)\bbearer\s+[A-Za-z0-9_.=+/-]+", "Bearer [REDACTED]"),
        // HTTP signature parameters
        Rule::new(r#"(?i)\b(keyId|signature)\s*=\s*"[^"]*""#, r#"$1="[REDACTED]""#),
        Rule::new(
            r#"(?i)\b(pass_?phrase|password|passwd|secret|security_token|token|private_key|key_file|fingerprint)(['"]?\s*[:=]\s*)['"]?[^\s'",}]+['"]?"#,
            "$1$2[REDACTED]",
        ),
        // API key fingerprints
        Rule::new(r"(?i)\b(?:[0-9a-f]{2}:){15}[0-9a-f]{2}\b", REDACTED),
        // Local filesystem paths; `:` excluded so URLs survive
        Rule::new(
            r#"(^|[\s'"=(\[])(?:~|/)(?:[A-Za-z0-9._-]+/)*[A-Za-z0-9._-]+"#,
            "${1}[PATH]",
        ),
    ]
});

/// Removes credentials and local paths from text, then bounds its length.
#[derive(Debug, Clone)]
pub struct Redactor {
    max_bytes: usize,
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIAGNOSTIC_BYTES)
    }
}

impl Redactor {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }

    pub fn redact<'a>(&self, input: &'a str) -> Cow<'a, str> {
        let mut result = Cow::Borrowed(input);
        for rule in RULES.iter() {
            if rule.regex.is_match(&result) {
                result = Cow::Owned(
                    rule.regex
                        .replace_all(&result, rule.replacement)
                        .into_owned(),
                );
            }
        }
        result
    }

    /// Redacts first, so a secret can never be split by the cut and slip past a pattern.
    pub fn sanitize(&self, input: &str) -> String {
        let redacted = self.redact(input);
        truncate(redacted.trim(), self.max_bytes)
    }
}

fn truncate(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return input.to_string();
    }
    let mut end = max_bytes;
    while !input.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &input[..end], TRUNCATED_SUFFIX)
}
