//! On-disk layout of catalog snapshots and deny lists.
//!
//! ```text
//! <dir>/commands_<version>.txt               catalog snapshot
//! <dir>/denylist_<version>                   deny list for that version
//! <dir>/denylist_<version>_backup_<stamp>    archived previous deny list
//! <dir>/denylist                             current alias read at startup
//! ```
//!
//! Every file is written to a `.tmp` sibling and renamed into place.

use crate::error::PolicyError;
use chrono::{DateTime, Utc};
use oci_gate_core::{CatalogSnapshot, OperationId, PolicyList};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

const CURRENT_ALIAS: &str = "denylist";
const LOCK_FILE: &str = ".denylist.lock";
const VERSION_HEADER: &str = "# version:";

/// A lock older than this is reported as stale even if its pid is alive.
pub const STALE_LOCK_SECS: i64 = 3600;

const SNAPSHOT_HEADER: &str = "# This list contains all OCI CLI commands\n";
const DENYLIST_HEADER: &str = "\
# This list contains the commands that can change the configuration of the cloud system.
# These commands will be denied execution and the AI client should immediately stop processing the command.
# It should also stop suggesting any alternatives to the user
";

pub struct PolicyStore {
    dir: PathBuf,
}

/// Exclusive writer lock, released on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to release policy store lock {}: {}", self.path.display(), e);
        }
    }
}

/// Contents of a lock file left by a writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHolder {
    pub path: PathBuf,
    pub pid: Option<u32>,
    pub acquired: Option<DateTime<Utc>>,
}

impl LockHolder {
    fn parse(path: PathBuf, content: &str) -> Self {
        let mut pid = None;
        let mut acquired = None;
        for line in content.lines() {
            match line.trim().split_once('=') {
                Some(("pid", v)) => pid = v.trim().parse().ok(),
                Some(("acquired", v)) => {
                    acquired = DateTime::parse_from_rfc3339(v.trim())
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }
        Self { path, pid, acquired }
    }

    /// The writer is gone, the lock is older than `max_age`, or the file was
    /// never filled in.
    pub fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        if self.pid.is_some_and(|pid| !process_alive(pid)) {
            return true;
        }
        match self.acquired {
            Some(at) => now - at > max_age,
            None => true,
        }
    }
}

fn process_alive(pid: u32) -> bool {
    let proc_root = Path::new("/proc");
    // Without procfs only the age check applies.
    if !proc_root.is_dir() {
        return true;
    }
    proc_root.join(pid.to_string()).exists()
}

impl PolicyStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_ALIAS)
    }

    pub fn versioned_path(&self, version: &str) -> PathBuf {
        self.dir
            .join(format!("{}_{}", CURRENT_ALIAS, sanitize_version(version)))
    }

    pub fn snapshot_path(&self, version: &str) -> PathBuf {
        self.dir
            .join(format!("commands_{}.txt", sanitize_version(version)))
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Takes the writer lock and records the holder's pid and start time in it.
    pub async fn lock(&self) -> Result<StoreLock, PolicyError> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.lock_path();
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(PolicyError::Locked(path))
            }
            Err(e) => return Err(e.into()),
        };

        // The guard exists before the write so a failed write still releases it.
        let lock = StoreLock { path };
        let body = format!(
            "pid={}\nacquired={}\n",
            std::process::id(),
            Utc::now().to_rfc3339()
        );
        file.write_all(body.as_bytes()).await?;
        file.flush().await?;
        Ok(lock)
    }

    /// Who holds the writer lock, if anyone.
    pub async fn lock_holder(&self) -> Result<Option<LockHolder>, PolicyError> {
        let path = self.lock_path();
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(LockHolder::parse(path, &content))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load_snapshot(&self, version: &str) -> Result<Option<CatalogSnapshot>, PolicyError> {
        let path = self.snapshot_path(version);
        if !fs::try_exists(&path).await? {
            return Ok(None);
        }
        let parsed = read_entries(&path).await?;
        debug!("Loaded {} commands from {}", parsed.entries.len(), path.display());
        Ok(Some(CatalogSnapshot::new(
            parsed.version.unwrap_or_else(|| version.to_string()),
            parsed.entries,
        )))
    }

    pub async fn save_snapshot(&self, snapshot: &CatalogSnapshot) -> Result<PathBuf, PolicyError> {
        let path = self.snapshot_path(&snapshot.version);
        let body = render(SNAPSHOT_HEADER, &snapshot.version, &snapshot.operations);
        write_atomic(&path, &body).await?;
        info!("Wrote {} commands to {}", snapshot.len(), path.display());
        Ok(path)
    }

    /// Loads the deny list named by the current alias.
    pub async fn load_current(&self) -> Result<PolicyList, PolicyError> {
        self.load_from(&self.current_path()).await
    }

    pub async fn load_versioned(&self, version: &str) -> Result<PolicyList, PolicyError> {
        let mut list = self.load_from(&self.versioned_path(version)).await?;
        if list.version.is_empty() {
            list.version = version.to_string();
        }
        Ok(list)
    }

    async fn load_from(&self, path: &Path) -> Result<PolicyList, PolicyError> {
        if !fs::try_exists(path).await? {
            return Err(PolicyError::NotFound(path.to_path_buf()));
        }
        let parsed = read_entries(path).await?;
        info!(
            "Read denylist from {} successfully. Blocking {} commands",
            path.display(),
            parsed.entries.len()
        );
        Ok(PolicyList::new(parsed.version.unwrap_or_default(), parsed.entries))
    }

    /// Renames an existing `denylist_<version>` out of the way.
    pub async fn archive_existing(&self, version: &str) -> Result<Option<PathBuf>, PolicyError> {
        let current = self.versioned_path(version);
        if !fs::try_exists(&current).await? {
            return Ok(None);
        }

        let stamp = chrono::Local::now().format("%d%b%y_%H%M").to_string();
        let base = format!(
            "{}_backup_{}",
            current.file_name().and_then(|n| n.to_str()).unwrap_or(CURRENT_ALIAS),
            stamp
        );
        let mut backup = self.dir.join(&base);
        let mut n = 1;
        while fs::try_exists(&backup).await? {
            backup = self.dir.join(format!("{}_{}", base, n));
            n += 1;
        }

        fs::rename(&current, &backup).await?;
        info!("Archived {} to {}", current.display(), backup.display());
        Ok(Some(backup))
    }

    /// Archives any previous list for the version, then writes the versioned
    /// file and the current alias. Returns the backup path, if one was made.
    pub async fn write_policy(&self, policy: &PolicyList) -> Result<Option<PathBuf>, PolicyError> {
        fs::create_dir_all(&self.dir).await?;
        let backup = self.archive_existing(&policy.version).await?;

        let body = render(DENYLIST_HEADER, &policy.version, &policy.denied);
        write_atomic(&self.versioned_path(&policy.version), &body).await?;
        write_atomic(&self.current_path(), &body).await?;
        Ok(backup)
    }

    pub async fn backups(&self, version: &str) -> Result<Vec<PathBuf>, PolicyError> {
        let prefix = format!("{}_{}_backup_", CURRENT_ALIAS, sanitize_version(version));
        let mut found = Vec::new();
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with(&prefix) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}

#[derive(Debug)]
struct ParsedEntries {
    version: Option<String>,
    entries: BTreeSet<OperationId>,
}

async fn read_entries(path: &Path) -> Result<ParsedEntries, PolicyError> {
    let content = fs::read_to_string(path).await?;
    parse_entries(path, &content)
}

fn parse_entries(path: &Path, content: &str) -> Result<ParsedEntries, PolicyError> {
    let mut version = None;
    let mut entries = BTreeSet::new();

    for (idx, line) in content.lines().enumerate() {
        let line = line.trim();
        if let Some(v) = line.strip_prefix(VERSION_HEADER) {
            version = Some(v.trim().to_string());
            continue;
        }
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let id = line.parse::<OperationId>().map_err(|_| PolicyError::Malformed {
            path: path.to_path_buf(),
            line: idx + 1,
            entry: line.to_string(),
        })?;
        entries.insert(id);
    }

    Ok(ParsedEntries { version, entries })
}

fn render(header: &str, version: &str, ids: &BTreeSet<OperationId>) -> String {
    let mut body = String::with_capacity(header.len() + ids.len() * 32);
    body.push_str(header);
    body.push_str(&format!("{} {}\n\n", VERSION_HEADER, version));
    for id in ids {
        body.push_str(id.as_str());
        body.push('\n');
    }
    body
}

async fn write_atomic(path: &Path, body: &str) -> Result<(), PolicyError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, body).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

fn sanitize_version(version: &str) -> String {
    version
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ids(items: &[&str]) -> BTreeSet<OperationId> {
        items.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_sanitize_version() {
        assert_eq!(sanitize_version("3.50.0"), "3.50.0");
        assert_eq!(sanitize_version(" 3.50/0 beta"), "3.50_0_beta");
    }

    #[test]
    fn test_parse_skips_comments_and_reads_version() {
        let content = "# header\n# version: 3.1.0\n\ncompute instance terminate\n  os bucket delete  \n";
        let parsed = parse_entries(Path::new("x"), content).unwrap();
        assert_eq!(parsed.version.as_deref(), Some("3.1.0"));
        assert_eq!(parsed.entries, ids(&["compute instance terminate", "os bucket delete"]));
    }

    #[test]
    fn test_parse_rejects_flag_entries() {
        let err = parse_entries(Path::new("x"), "compute instance list --all\n").unwrap_err();
        assert!(matches!(err, PolicyError::Malformed { line: 1, .. }));
    }

    #[tokio::test]
    async fn test_policy_round_trip_through_current_alias() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        let policy = PolicyList::new("3.2.0", ids(&["network vcn delete", "compute instance terminate"]));

        let backup = store.write_policy(&policy).await.unwrap();
        assert!(backup.is_none());

        assert_eq!(store.load_current().await.unwrap(), policy);
        assert_eq!(store.load_versioned("3.2.0").await.unwrap(), policy);
    }

    #[tokio::test]
    async fn test_load_current_missing() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        assert!(matches!(store.load_current().await, Err(PolicyError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_archive_never_overwrites_previous_backup() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        let policy = PolicyList::new("1.0", ids(&["os bucket delete"]));

        store.write_policy(&policy).await.unwrap();
        let first = store.write_policy(&policy).await.unwrap().unwrap();
        let second = store.write_policy(&policy).await.unwrap().unwrap();

        assert_ne!(first, second);
        assert_eq!(store.backups("1.0").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_lock_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());

        let guard = store.lock().await.unwrap();
        assert!(matches!(store.lock().await, Err(PolicyError::Locked(_))));
        drop(guard);
        assert!(store.lock().await.is_ok());
    }

    #[tokio::test]
    async fn test_lock_records_holder() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        assert!(store.lock_holder().await.unwrap().is_none());

        let guard = store.lock().await.unwrap();
        let holder = store.lock_holder().await.unwrap().unwrap();
        assert_eq!(holder.pid, Some(std::process::id()));
        assert!(holder.acquired.is_some());
        assert!(!holder.is_stale(Utc::now(), chrono::Duration::seconds(STALE_LOCK_SECS)));

        drop(guard);
        assert!(store.lock_holder().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_abandoned_lock_is_stale() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        let max_age = chrono::Duration::seconds(STALE_LOCK_SECS);

        std::fs::write(
            store.lock_path(),
            "pid=4294967295\nacquired=2020-01-01T00:00:00+00:00\n",
        )
        .unwrap();
        let holder = store.lock_holder().await.unwrap().unwrap();
        assert_eq!(holder.pid, Some(u32::MAX));
        assert!(holder.is_stale(Utc::now(), max_age));
        assert!(matches!(store.lock().await, Err(PolicyError::Locked(_))));

        // Left empty by a writer killed before it recorded itself.
        std::fs::write(store.lock_path(), "").unwrap();
        let holder = store.lock_holder().await.unwrap().unwrap();
        assert!(holder.is_stale(Utc::now(), max_age));
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let temp = TempDir::new().unwrap();
        let store = PolicyStore::new(temp.path());
        assert!(store.load_snapshot("2.0").await.unwrap().is_none());

        let snapshot = CatalogSnapshot::new("2.0", ids(&["compute instance list", "os ns get"]));
        store.save_snapshot(&snapshot).await.unwrap();
        assert_eq!(store.load_snapshot("2.0").await.unwrap(), Some(snapshot));
    }
}
