use rlimit::{getrlimit, setrlimit, Resource};
use serde::{Deserialize, Serialize};

const CPU_LIMIT: u64 = 300; // seconds
const FILE_SIZE_LIMIT: u64 = 100 * 1024 * 1024; // 100MB
const NOFILE_LIMIT: u64 = 1024;

/// Kernel limits applied to the CLI process between fork and exec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimits {
    pub cpu_seconds: Option<u64>,
    pub file_size_bytes: Option<u64>,
    pub open_files: Option<u64>,
    pub address_space_bytes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: Some(CPU_LIMIT),
            file_size_bytes: Some(FILE_SIZE_LIMIT),
            open_files: Some(NOFILE_LIMIT),
            address_space_bytes: None,
        }
    }
}

impl ResourceLimits {
    pub fn unlimited() -> Self {
        Self {
            cpu_seconds: None,
            file_size_bytes: None,
            open_files: None,
            address_space_bytes: None,
        }
    }

    /// Lowers the calling process's limits. Never raises above the current hard limit.
    ///
    /// Runs inside `pre_exec`, so it must not allocate.
    pub fn apply(&self) -> std::io::Result<()> {
        let pairs = [
            (Resource::CPU, self.cpu_seconds),
            (Resource::FSIZE, self.file_size_bytes),
            (Resource::NOFILE, self.open_files),
            (Resource::AS, self.address_space_bytes),
        ];

        for (resource, limit) in pairs {
            if let Some(limit) = limit {
                let (_, hard) = getrlimit(resource)?;
                let value = limit.min(hard);
                setrlimit(resource, value, value)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_leave_address_space_alone() {
        let limits = ResourceLimits::default();
        assert_eq!(limits.cpu_seconds, Some(CPU_LIMIT));
        assert!(limits.address_space_bytes.is_none());
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let limits: ResourceLimits = serde_json::from_str(r#"{"cpu_seconds": 10}"#).unwrap();
        assert_eq!(limits.cpu_seconds, Some(10));
        assert_eq!(limits.open_files, Some(NOFILE_LIMIT));
    }

    #[test]
    fn test_unlimited_apply_is_noop() {
        assert!(ResourceLimits::unlimited().apply().is_ok());
    }
}
