use crate::error::PolicyError;
use crate::store::PolicyStore;
use crate::verbs::VerbMatcher;
use async_trait::async_trait;
use oci_gate_core::{CatalogSnapshot, OperationId, PolicyList};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{info, warn};

/// Something that can list every leaf command of the external CLI.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Version string of the installed tool; keys every persisted artifact.
    async fn version(&self) -> Result<String, PolicyError>;

    async fn enumerate(&self) -> Result<BTreeSet<OperationId>, PolicyError>;
}

/// Fixed catalog, used offline and in tests.
pub struct StaticCatalog {
    version: String,
    operations: BTreeSet<OperationId>,
}

impl StaticCatalog {
    pub fn new(version: impl Into<String>, operations: impl IntoIterator<Item = OperationId>) -> Self {
        Self {
            version: version.into(),
            operations: operations.into_iter().collect(),
        }
    }
}

impl From<CatalogSnapshot> for StaticCatalog {
    fn from(snapshot: CatalogSnapshot) -> Self {
        Self {
            version: snapshot.version,
            operations: snapshot.operations,
        }
    }
}

#[async_trait]
impl CatalogSource for StaticCatalog {
    async fn version(&self) -> Result<String, PolicyError> {
        Ok(self.version.clone())
    }

    async fn enumerate(&self) -> Result<BTreeSet<OperationId>, PolicyError> {
        Ok(self.operations.clone())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub policy: PolicyList,
    pub total: usize,
    pub snapshot_reused: bool,
    pub backup: Option<PathBuf>,
}

impl GenerationReport {
    pub fn denied(&self) -> usize {
        self.policy.len()
    }
}

pub struct PolicyGenerator {
    matcher: VerbMatcher,
    store: PolicyStore,
}

impl PolicyGenerator {
    pub fn new(matcher: VerbMatcher, store: PolicyStore) -> Self {
        Self { matcher, store }
    }

    pub fn store(&self) -> &PolicyStore {
        &self.store
    }

    /// Pure derivation: every snapshot entry whose terminal verb is mutating.
    pub fn derive(&self, snapshot: &CatalogSnapshot) -> PolicyList {
        PolicyList::new(
            snapshot.version.clone(),
            snapshot
                .operations
                .iter()
                .filter(|id| self.matcher.is_mutating(id))
                .cloned(),
        )
    }

    /// Regenerates the deny list for the currently installed CLI version.
    ///
    /// Nothing is written unless the catalog could be read in full.
    pub async fn generate(&self, source: &dyn CatalogSource) -> Result<GenerationReport, PolicyError> {
        let _lock = self.store.lock().await?;

        let version = source.version().await?;
        if version.trim().is_empty() {
            return Err(PolicyError::ToolUnavailable("empty version string".into()));
        }

        let (snapshot, snapshot_reused) = match self.store.load_snapshot(&version).await? {
            Some(snapshot) => {
                info!("Commands already exist for version {}", version);
                (snapshot, true)
            }
            None => {
                info!("Enumerating commands for version {}", version);
                let operations = source.enumerate().await?;
                if operations.is_empty() {
                    return Err(PolicyError::ToolUnavailable(
                        "command catalog is empty".into(),
                    ));
                }
                let snapshot = CatalogSnapshot::new(version.clone(), operations);
                self.store.save_snapshot(&snapshot).await?;
                (snapshot, false)
            }
        };

        let policy = self.derive(&snapshot);
        if !policy.is_subset_of(&snapshot) {
            warn!("Derived deny list is not a subset of the catalog for {}", version);
        }

        let backup = self.store.write_policy(&policy).await?;
        info!(
            "{} commands will be denied out of {} commands",
            policy.len(),
            snapshot.len()
        );

        Ok(GenerationReport {
            total: snapshot.len(),
            policy,
            snapshot_reused,
            backup,
        })
    }
}
