use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_MAX_AUDIT_BYTES: u64 = 5 * 1024 * 1024;

/// Sink for one record per dispatch. Logging never fails the dispatch.
#[async_trait]
pub trait AuditLogger: Send + Sync {
    async fn log(&self, entry: serde_json::Value);
}

/// Append-only JSON-lines file, rotated to `<path>.1` once it grows past
/// `max_bytes`. One backup is kept.
pub struct JsonlAuditLogger {
    path: PathBuf,
    max_bytes: u64,
    file: Mutex<File>,
}

impl JsonlAuditLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        Self::with_max_bytes(path, DEFAULT_MAX_AUDIT_BYTES)
    }

    pub fn with_max_bytes<P: AsRef<Path>>(path: P, max_bytes: u64) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;

        Ok(Self {
            path,
            max_bytes,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".1");
        PathBuf::from(name)
    }

    fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock();

        if file.metadata()?.len() + line.len() as u64 + 1 > self.max_bytes {
            fs::rename(&self.path, self.backup_path())?;
            *file = open_append(&self.path)?;
        }

        writeln!(file, "{}", line)?;
        file.sync_data()
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

#[async_trait]
impl AuditLogger for JsonlAuditLogger {
    async fn log(&self, entry: serde_json::Value) {
        let line = match serde_json::to_string(&entry) {
            Ok(line) => line,
            Err(e) => {
                warn!("Failed to serialize audit entry: {}", e);
                return;
            }
        };
        if let Err(e) = self.write_line(&line) {
            warn!("Failed to write audit entry to {}: {}", self.path.display(), e);
        }
    }
}

pub struct NoopAuditLogger;

#[async_trait]
impl AuditLogger for NoopAuditLogger {
    async fn log(&self, _entry: serde_json::Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn lines(path: &Path) -> usize {
        fs::read_to_string(path).map(|s| s.lines().count()).unwrap_or(0)
    }

    #[test]
    fn test_appends_one_line_per_entry() {
        let temp = TempDir::new().unwrap();
        let logger = JsonlAuditLogger::new(temp.path().join("logs/audit.jsonl")).unwrap();

        for i in 0..3 {
            tokio_test::block_on(logger.log(json!({"n": i})));
        }

        assert_eq!(lines(logger.path()), 3);
        let first: serde_json::Value =
            serde_json::from_str(fs::read_to_string(logger.path()).unwrap().lines().next().unwrap()).unwrap();
        assert_eq!(first["n"], 0);
    }

    #[tokio::test]
    async fn test_rotates_with_single_backup() {
        let temp = TempDir::new().unwrap();
        let logger = JsonlAuditLogger::with_max_bytes(temp.path().join("audit.jsonl"), 64).unwrap();
        let entry = json!({"pad": "x".repeat(30)});

        for _ in 0..5 {
            logger.log(entry.clone()).await;
        }

        // Each line is 41 bytes, so only one fits per file.
        assert_eq!(lines(logger.path()), 1);
        assert_eq!(lines(&logger.backup_path()), 1);
        assert!(!temp.path().join("audit.jsonl.2").exists());
    }
}
