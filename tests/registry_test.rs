use std::path::Path;
use std::sync::Arc;

use bindery::error::ApiError;
use bindery::registry::SessionRegistry;
use bindery::scan::ScanOptions;
use bindery::storage::Storage;

async fn registry_in(data_dir: &Path) -> Arc<SessionRegistry> {
    let storage = Arc::new(Storage::open(data_dir).await.unwrap());
    Arc::new(SessionRegistry::new(storage, ScanOptions::default()))
}

#[tokio::test]
async fn binding_the_same_folder_twice_returns_one_session() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("book");
    std::fs::create_dir(&book).unwrap();
    std::fs::write(book.join("README.md"), "# hi").unwrap();

    let registry = registry_in(tmp.path()).await;
    let first = registry.create_or_get(&book).await.unwrap();
    let second = registry.create_or_get(&book).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(registry.list().await.unwrap().len(), 1);

    let snapshot = registry.get(&first).await.unwrap();
    assert_eq!(snapshot.structure.len(), 1);
    assert_eq!(snapshot.structure[0].name, "README.md");
}

#[tokio::test]
async fn concurrent_binds_of_one_folder_race_to_a_single_session() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("book");
    std::fs::create_dir(&book).unwrap();

    let registry = registry_in(tmp.path()).await;
    let mut handles = Vec::new();
    for _ in 0..8 {
        let registry = registry.clone();
        let book = book.clone();
        handles.push(tokio::spawn(
            async move { registry.create_or_get(&book).await },
        ));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1, "all binds must agree on one session id");
    assert_eq!(registry.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn rename_moves_the_directory_and_keeps_the_id() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("draft");
    std::fs::create_dir(&book).unwrap();
    std::fs::write(book.join("ch1.md"), "# one").unwrap();

    let registry = registry_in(tmp.path()).await;
    let id = registry.create_or_get(&book).await.unwrap();

    let renamed = registry.rename(&id, "published").await.unwrap();
    assert_eq!(renamed, tmp.path().join("published"));
    assert!(!book.exists());
    assert!(renamed.join("ch1.md").exists());

    // Same id resolves to the new location.
    let snapshot = registry.get(&id).await.unwrap();
    assert_eq!(snapshot.folder_path, renamed);
}

#[tokio::test]
async fn rename_onto_an_existing_sibling_changes_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("draft");
    std::fs::create_dir(&book).unwrap();
    std::fs::create_dir(tmp.path().join("taken")).unwrap();

    let registry = registry_in(tmp.path()).await;
    let id = registry.create_or_get(&book).await.unwrap();

    let err = registry.rename(&id, "taken").await.unwrap_err();
    assert!(matches!(err, ApiError::AlreadyExists(_)));
    assert!(book.exists(), "source folder must be untouched");
    let snapshot = registry.get(&id).await.unwrap();
    assert!(snapshot.folder_path.ends_with("draft"));
}

#[tokio::test]
async fn concurrent_renames_to_one_name_leave_exactly_one_winner() {
    let tmp = tempfile::tempdir().unwrap();
    let a = tmp.path().join("a");
    let b = tmp.path().join("b");
    std::fs::create_dir(&a).unwrap();
    std::fs::create_dir(&b).unwrap();

    let registry = registry_in(tmp.path()).await;
    let id_a = registry.create_or_get(&a).await.unwrap();
    let id_b = registry.create_or_get(&b).await.unwrap();

    let ra = {
        let registry = registry.clone();
        let id = id_a.clone();
        tokio::spawn(async move { registry.rename(&id, "shared").await })
    };
    let rb = {
        let registry = registry.clone();
        let id = id_b.clone();
        tokio::spawn(async move { registry.rename(&id, "shared").await })
    };
    let results = [ra.await.unwrap(), rb.await.unwrap()];

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one rename may claim the name");
    let loser = results.into_iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(loser.unwrap_err(), ApiError::AlreadyExists(_)));

    // The winner's folder moved, the loser's stayed where it was.
    assert!(tmp.path().join("shared").is_dir());
    let survivors = [a.exists(), b.exists()];
    assert_eq!(survivors.iter().filter(|kept| **kept).count(), 1);
}

#[tokio::test]
async fn deregister_never_touches_folder_contents() {
    let tmp = tempfile::tempdir().unwrap();
    let book = tmp.path().join("book");
    std::fs::create_dir(&book).unwrap();
    std::fs::write(book.join("keep.md"), "# keep").unwrap();

    let registry = registry_in(tmp.path()).await;
    let id = registry.create_or_get(&book).await.unwrap();
    registry.deregister(&id).await.unwrap();

    assert!(matches!(
        registry.get(&id).await.unwrap_err(),
        ApiError::NotFound(_)
    ));
    assert_eq!(
        std::fs::read_to_string(book.join("keep.md")).unwrap(),
        "# keep"
    );

    let err = registry.deregister(&id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn sessions_with_vanished_folders_are_skipped_in_listings() {
    let tmp = tempfile::tempdir().unwrap();
    let kept = tmp.path().join("kept");
    let doomed = tmp.path().join("doomed");
    std::fs::create_dir(&kept).unwrap();
    std::fs::create_dir(&doomed).unwrap();

    let registry = registry_in(tmp.path()).await;
    let kept_id = registry.create_or_get(&kept).await.unwrap();
    let doomed_id = registry.create_or_get(&doomed).await.unwrap();

    std::fs::remove_dir_all(&doomed).unwrap();
    let listed = registry.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].session_id, kept_id);

    let err = registry.get(&doomed_id).await.unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}
