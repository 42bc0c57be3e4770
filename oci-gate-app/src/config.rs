use anyhow::{Context, Result};
use oci_gate_executor::ResourceLimits;
use oci_gate_policy::{VerbMatch, DEFAULT_DENIED_VERBS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "oci-gate.yaml";

/// Gateway settings: YAML file first, then environment overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub log_level: String,
    /// The OCI CLI executable.
    pub cli: PathBuf,
    pub policy_dir: PathBuf,
    pub profile: String,
    pub auth: String,
    /// Exported to the CLI as `OCI_CLI_TENANCY` when set.
    pub tenancy: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub max_output_bytes: usize,
    pub max_diagnostic_bytes: usize,
    pub denied_verbs: Vec<String>,
    pub verb_match: VerbMatch,
    pub limits: ResourceLimits,
    /// JSON-lines audit file; `None` disables auditing.
    pub audit_log: Option<PathBuf>,
    pub audit_max_bytes: u64,
    /// Start with an empty deny list instead of refusing to start.
    pub allow_missing_denylist: bool,
    /// Start without a catalog snapshot and run operations nothing can vouch for.
    pub allow_missing_catalog: bool,
    pub allow_file_arguments: bool,
    pub catalog_concurrency: usize,
    pub help_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            cli: PathBuf::from("oci"),
            policy_dir: PathBuf::from("./policy"),
            profile: "DEFAULT".to_string(),
            auth: "security_token".to_string(),
            tenancy: None,
            user_agent: format!("oci-gate/{}", env!("CARGO_PKG_VERSION")),
            timeout_ms: 120_000,
            max_output_bytes: 16 * 1024 * 1024,
            max_diagnostic_bytes: oci_gate_tools::DEFAULT_MAX_DIAGNOSTIC_BYTES,
            denied_verbs: DEFAULT_DENIED_VERBS.iter().map(|v| v.to_string()).collect(),
            verb_match: VerbMatch::default(),
            limits: ResourceLimits::default(),
            audit_log: Some(PathBuf::from("./data/audit.jsonl")),
            audit_max_bytes: oci_gate_tools::DEFAULT_MAX_AUDIT_BYTES,
            allow_missing_denylist: false,
            allow_missing_catalog: false,
            allow_file_arguments: false,
            catalog_concurrency: 8,
            help_timeout_ms: 60_000,
        }
    }
}

impl GatewayConfig {
    /// Loads `path`, or `oci-gate.yaml` in the working directory when it
    /// exists, then applies environment overrides and validates.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(profile) = lookup("OCI_CONFIG_PROFILE") {
            self.profile = profile;
        }
        if let Some(tenancy) = lookup("TENANCY_ID_OVERRIDE") {
            self.tenancy = Some(tenancy);
        }
        if let Some(timeout) = lookup("OCI_GATE_TIMEOUT_MS") {
            self.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("OCI_GATE_TIMEOUT_MS is not a number: {:?}", timeout))?;
        }
        if let Some(dir) = lookup("OCI_GATE_POLICY_DIR") {
            self.policy_dir = PathBuf::from(dir);
        }
        if let Some(cli) = lookup("OCI_GATE_CLI") {
            self.cli = PathBuf::from(cli);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout_ms == 0 {
            anyhow::bail!("timeout_ms must be greater than zero");
        }
        if self.help_timeout_ms == 0 {
            anyhow::bail!("help_timeout_ms must be greater than zero");
        }
        if self.max_output_bytes == 0 || self.max_diagnostic_bytes == 0 {
            anyhow::bail!("output limits must be greater than zero");
        }
        if self.denied_verbs.iter().all(|v| v.trim().is_empty()) {
            anyhow::bail!("denied_verbs must name at least one verb");
        }
        if self.profile.trim().is_empty() || self.auth.trim().is_empty() {
            anyhow::bail!("profile and auth must not be empty");
        }
        if self.cli.as_os_str().is_empty() {
            anyhow::bail!("cli must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: GatewayConfig = serde_yaml::from_str(
            "timeout_ms: 5000\nverb_match: segment\ndenied_verbs: [delete, cancel]\nlimits:\n  cpu_seconds: 30\n",
        )
        .unwrap();
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(config.verb_match, VerbMatch::Segment);
        assert_eq!(config.denied_verbs, vec!["delete", "cancel"]);
        assert_eq!(config.limits.cpu_seconds, Some(30));
        assert_eq!(config.profile, "DEFAULT");
        assert_eq!(config.auth, "security_token");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_overrides(env(&[
                ("OCI_CONFIG_PROFILE", "prod"),
                ("TENANCY_ID_OVERRIDE", "ocid1.tenancy.oc1..x"),
                ("OCI_GATE_TIMEOUT_MS", "2500"),
                ("OCI_GATE_CLI", "/opt/oci/bin/oci"),
            ]))
            .unwrap();
        assert_eq!(config.profile, "prod");
        assert_eq!(config.tenancy.as_deref(), Some("ocid1.tenancy.oc1..x"));
        assert_eq!(config.timeout_ms, 2500);
        assert_eq!(config.cli, PathBuf::from("/opt/oci/bin/oci"));
        assert_eq!(config.policy_dir, PathBuf::from("./policy"));
    }

    #[test]
    fn test_bad_timeout_override_is_an_error() {
        let mut config = GatewayConfig::default();
        assert!(config
            .apply_overrides(env(&[("OCI_GATE_TIMEOUT_MS", "soon")]))
            .is_err());
    }

    #[test]
    fn test_validate() {
        assert!(GatewayConfig::default().validate().is_ok());

        let config = GatewayConfig {
            timeout_ms: 0,
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());

        let config = GatewayConfig {
            denied_verbs: vec![" ".into()],
            ..GatewayConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
