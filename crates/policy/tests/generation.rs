use oci_gate_core::{CatalogSnapshot, OperationId};
use oci_gate_policy::*;
use std::collections::BTreeSet;
use tempfile::TempDir;

fn catalog(items: &[&str]) -> Vec<OperationId> {
    items.iter().map(|s| s.parse().unwrap()).collect()
}

const OCI_SAMPLE: &[&str] = &[
    "compute instance list",
    "compute instance get",
    "compute instance launch",
    "compute instance terminate",
    "compute instance update",
    "compute instance action",
    "network vcn create",
    "network vcn delete",
    "network vcn list",
    "os object put",
    "os object get",
    "os object bulk-delete",
    "os bucket replace-tags",
    "os replication replacement-policy-get",
    "iam user remove",
    "iam user api-key delete",
    "db autonomous-database patch",
    "db autonomous-database updates-list",
];

#[tokio::test]
async fn test_policy_is_subset_of_snapshot() {
    let temp = TempDir::new().unwrap();
    let generator = PolicyGenerator::new(VerbMatcher::default(), PolicyStore::new(temp.path()));
    let source = StaticCatalog::new("3.45.0", catalog(OCI_SAMPLE));

    let report = generator.generate(&source).await.unwrap();
    let snapshot = CatalogSnapshot::new("3.45.0", catalog(OCI_SAMPLE));

    assert!(report.policy.is_subset_of(&snapshot));
    assert!(report.denied() < report.total);
    assert_eq!(report.total, OCI_SAMPLE.len());
}

#[tokio::test]
async fn test_exact_verb_membership() {
    let temp = TempDir::new().unwrap();
    let generator = PolicyGenerator::new(
        VerbMatcher::new(DEFAULT_DENIED_VERBS, VerbMatch::Segment),
        PolicyStore::new(temp.path()),
    );
    let snapshot = CatalogSnapshot::new("3.45.0", catalog(OCI_SAMPLE));
    let policy = generator.derive(&snapshot);

    for id in &snapshot.operations {
        let exact = DEFAULT_DENIED_VERBS.contains(&id.terminal());
        assert_eq!(policy.contains(id), exact, "{}", id);
    }
}

#[tokio::test]
async fn test_default_mode_denies_leading_verb_words() {
    let temp = TempDir::new().unwrap();
    let generator = PolicyGenerator::new(VerbMatcher::default(), PolicyStore::new(temp.path()));
    let snapshot = CatalogSnapshot::new("3.45.0", catalog(OCI_SAMPLE));
    let policy = generator.derive(&snapshot);

    // Exact verbs plus `<verb>-...` leaves; `bulk-delete` and `updates-list` stay allowed.
    let expected: BTreeSet<OperationId> = catalog(&[
        "compute instance terminate",
        "compute instance update",
        "network vcn delete",
        "os object put",
        "os bucket replace-tags",
        "iam user remove",
        "iam user api-key delete",
        "db autonomous-database patch",
    ])
    .into_iter()
    .collect();
    assert_eq!(policy.denied, expected);

    for id in &snapshot.operations {
        let leading = id.terminal().split('-').next().unwrap_or_default();
        assert_eq!(policy.contains(id), DEFAULT_DENIED_VERBS.contains(&leading), "{}", id);
    }
}

#[tokio::test]
async fn test_regeneration_is_idempotent_with_one_backup() {
    let temp = TempDir::new().unwrap();
    let store = PolicyStore::new(temp.path());
    let generator = PolicyGenerator::new(VerbMatcher::default(), PolicyStore::new(temp.path()));
    let source = StaticCatalog::new("3.45.0", catalog(OCI_SAMPLE));

    let first = generator.generate(&source).await.unwrap();
    assert!(first.backup.is_none());
    let first_bytes = std::fs::read(store.versioned_path("3.45.0")).unwrap();

    let second = generator.generate(&source).await.unwrap();
    let second_bytes = std::fs::read(store.versioned_path("3.45.0")).unwrap();

    assert_eq!(first.policy, second.policy);
    assert_eq!(first_bytes, second_bytes);

    let backups = store.backups("3.45.0").await.unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(second.backup.as_ref(), Some(&backups[0]));
    assert_eq!(std::fs::read(&backups[0]).unwrap(), first_bytes);
}

#[tokio::test]
async fn test_end_to_end_catalog_to_current_alias() {
    let temp = TempDir::new().unwrap();
    let store = PolicyStore::new(temp.path());
    let generator = PolicyGenerator::new(VerbMatcher::default(), PolicyStore::new(temp.path()));
    let source = StaticCatalog::new(
        "3.45.0",
        catalog(&[
            "compute instance list",
            "compute instance terminate",
            "compute instance launch",
        ]),
    );

    generator.generate(&source).await.unwrap();

    let current = store.load_current().await.unwrap();
    let expected: BTreeSet<OperationId> = catalog(&["compute instance terminate"]).into_iter().collect();
    assert_eq!(current.denied, expected);
    assert_eq!(current.version, "3.45.0");
}

#[tokio::test]
async fn test_new_version_does_not_archive_old_version() {
    let temp = TempDir::new().unwrap();
    let store = PolicyStore::new(temp.path());
    let generator = PolicyGenerator::new(VerbMatcher::default(), PolicyStore::new(temp.path()));

    generator
        .generate(&StaticCatalog::new("1.0", catalog(&["os bucket delete", "os bucket list"])))
        .await
        .unwrap();
    let report = generator
        .generate(&StaticCatalog::new("2.0", catalog(&["os bucket delete", "os bucket get"])))
        .await
        .unwrap();

    assert!(report.backup.is_none());
    assert!(store.versioned_path("1.0").exists());
    assert_eq!(store.load_current().await.unwrap().version, "2.0");
}
