use gw_storage::{CreateProjectRequest, CreateVersionRequest, SqliteStore, StoreError};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_storage_dir(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic enough for tests")
        .as_nanos();
    path.push(format!(
        "gw-storage-working-sets-{label}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&path).expect("temp storage dir must be creatable");
    path
}

fn project(store: &mut SqliteStore, id: &str) {
    store
        .create_project(CreateProjectRequest {
            id: Some(id.to_string()),
            name: id.to_string(),
            ..CreateProjectRequest::default()
        })
        .expect("project should be created");
}

fn version(
    store: &mut SqliteStore,
    project_id: &str,
    parent: Option<&str>,
    name: &str,
    is_working_set: bool,
) -> Result<gw_core::graph::GraphVersion, StoreError> {
    store.create_version(CreateVersionRequest {
        project_id: project_id.to_string(),
        parent_version_id: parent.map(str::to_string),
        name: name.to_string(),
        description: String::new(),
        is_working_set,
    })
}

fn working_set_count(dir: &std::path::Path, project_id: &str) -> i64 {
    let conn = Connection::open(dir.join("graphwrite.db")).expect("db must open");
    conn.query_row(
        "SELECT COUNT(*) FROM working_sets WHERE project_id=?1",
        [project_id],
        |row| row.get(0),
    )
    .expect("count query must succeed")
}

#[test]
fn root_version_becomes_the_only_working_set() {
    let dir = temp_storage_dir("root");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");

    let root = version(&mut store, "book1", None, "root", true).expect("root version");
    assert!(root.is_working_set);
    let child = version(&mut store, "book1", Some(&root.id), "draft", false).expect("child version");
    assert!(!child.is_working_set);

    let current = store.get_working_set("book1").expect("working set must exist");
    assert_eq!(current.id, root.id);
    assert_eq!(working_set_count(&dir, "book1"), 1);

    let versions = store.list_versions("book1").expect("versions");
    assert_eq!(versions.iter().filter(|v| v.is_working_set).count(), 1);
}

#[test]
fn second_working_set_on_insert_is_a_conflict() {
    let dir = temp_storage_dir("conflict");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    let root = version(&mut store, "book1", None, "root", true).expect("root version");

    let err = version(&mut store, "book1", Some(&root.id), "rival", true)
        .expect_err("second working set must be rejected");
    assert!(matches!(err, StoreError::WorkingSetConflict(ref p) if p == "book1"));
    assert_eq!(err.code(), "CONFLICT");

    // The failed insert rolled back the version row too.
    assert_eq!(store.list_versions("book1").expect("versions").len(), 1);
    assert_eq!(working_set_count(&dir, "book1"), 1);
}

#[test]
fn set_working_set_is_idempotent_and_exclusive() {
    let dir = temp_storage_dir("idempotent");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    let root = version(&mut store, "book1", None, "root", true).expect("root version");
    let next = version(&mut store, "book1", Some(&root.id), "next", false).expect("next version");

    let moved = store.set_working_set("book1", &next.id).expect("first move");
    assert!(moved.is_working_set);
    store.set_working_set("book1", &next.id).expect("repeat move");

    let versions = store.list_versions("book1").expect("versions");
    let flagged = versions
        .iter()
        .filter(|v| v.is_working_set)
        .map(|v| v.id.clone())
        .collect::<Vec<_>>();
    assert_eq!(flagged, vec![next.id.clone()]);
    assert_eq!(working_set_count(&dir, "book1"), 1);
    assert!(!store.get_version(&root.id).expect("root").is_working_set);
}

#[test]
fn set_working_set_rejects_versions_of_other_projects() {
    let dir = temp_storage_dir("foreign");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    project(&mut store, "book2");
    let root1 = version(&mut store, "book1", None, "root", true).expect("book1 root");
    let root2 = version(&mut store, "book2", None, "root", true).expect("book2 root");

    let err = store
        .set_working_set("book1", &root2.id)
        .expect_err("foreign version must be rejected");
    assert!(err.is_not_found());
    assert_eq!(store.get_working_set("book1").expect("ws").id, root1.id);

    let err = store
        .set_working_set("ghost", &root1.id)
        .expect_err("unknown project must be rejected");
    assert!(matches!(err, StoreError::UnknownProject(_)));
}

#[test]
fn version_parent_must_exist_in_the_same_project() {
    let dir = temp_storage_dir("parents");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    project(&mut store, "book2");
    let root2 = version(&mut store, "book2", None, "root", true).expect("book2 root");

    let err = version(&mut store, "book1", Some(&root2.id), "cross", false)
        .expect_err("cross-project parent must be rejected");
    assert!(err.is_validation());

    let err = version(&mut store, "book1", Some("missing"), "orphan", false)
        .expect_err("unknown parent must be rejected");
    assert!(matches!(err, StoreError::UnknownVersion(_)));

    let err = version(&mut store, "nobody", None, "root", true).expect_err("unknown project");
    assert!(matches!(err, StoreError::UnknownProject(_)));
}

#[test]
fn projects_without_working_set_report_not_found() {
    let dir = temp_storage_dir("no-ws");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    version(&mut store, "book1", None, "root", false).expect("root without working set");

    let err = store.get_working_set("book1").expect_err("no working set yet");
    assert!(matches!(err, StoreError::NoWorkingSet(_)));
}

#[test]
fn versions_are_listed_newest_first() {
    let dir = temp_storage_dir("order");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    let root = version(&mut store, "book1", None, "root", true).expect("root");
    let a = version(&mut store, "book1", Some(&root.id), "a", false).expect("a");
    let b = version(&mut store, "book1", Some(&a.id), "b", false).expect("b");

    let ids = store
        .list_versions("book1")
        .expect("versions")
        .into_iter()
        .map(|v| v.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![b.id, a.id, root.id]);
}

#[test]
fn duplicate_project_ids_conflict() {
    let dir = temp_storage_dir("dup-project");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    project(&mut store, "book1");
    let err = store
        .create_project(CreateProjectRequest {
            id: Some("book1".to_string()),
            name: "again".to_string(),
            ..CreateProjectRequest::default()
        })
        .expect_err("duplicate id must be rejected");
    assert!(matches!(err, StoreError::ProjectAlreadyExists(_)));
    assert!(err.is_conflict());

    let generated = store
        .create_project(CreateProjectRequest {
            name: "Book Two".to_string(),
            genre: Some("fantasy".to_string()),
            ..CreateProjectRequest::default()
        })
        .expect("generated id");
    assert!(!generated.id.is_empty());
    assert_eq!(store.get_project(&generated.id).expect("lookup"), generated);
    assert_eq!(store.list_projects().expect("projects").len(), 2);
}
