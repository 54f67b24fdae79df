use gw_core::cancel::CancelToken;
use gw_core::graph::{
    ApplyRequest, Delta, EntityType, GraphVersion, NeighborDirection, RelationshipDelta,
};
use gw_storage::{
    CreateProjectRequest, CreateVersionRequest, ListEntitiesRequest, NeighborsRequest,
    SqliteStore, StoreConfig, StoreError,
};
use rusqlite::{Connection, params};
use serde_json::json;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_storage_dir(label: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be monotonic enough for tests")
        .as_nanos();
    path.push(format!(
        "gw-storage-apply-{label}-{}-{nanos}",
        std::process::id()
    ));
    std::fs::create_dir_all(&path).expect("temp storage dir must be creatable");
    path
}

fn bootstrap(store: &mut SqliteStore, project_id: &str) -> GraphVersion {
    store
        .create_project(CreateProjectRequest {
            id: Some(project_id.to_string()),
            name: project_id.to_string(),
            ..CreateProjectRequest::default()
        })
        .expect("project should be created");
    store
        .create_version(CreateVersionRequest {
            project_id: project_id.to_string(),
            parent_version_id: None,
            name: "root".to_string(),
            description: "initial state".to_string(),
            is_working_set: true,
        })
        .expect("root version should be created")
}

fn apply(store: &mut SqliteStore, parent: &str, deltas: Vec<Delta>) -> String {
    store
        .apply(ApplyRequest {
            parent_version_id: parent.to_string(),
            deltas,
            ..ApplyRequest::default()
        })
        .expect("batch should apply")
        .version_id
}

#[test]
fn created_character_round_trips_through_the_view() {
    let dir = temp_storage_dir("round-trip");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");

    let result = store
        .apply(ApplyRequest {
            parent_version_id: root.id.clone(),
            version_name: Some("introduce elena".to_string()),
            version_description: None,
            deltas: vec![
                Delta::create(EntityType::Character, "elena-x")
                    .field("name", "Elena")
                    .field("level", 1)
                    .field("traits", json!(["brave", "curious"])),
            ],
        })
        .expect("batch should apply");
    assert_eq!(result.applied, 1);
    assert_eq!(result.entities_written, 1);

    let version = store.get_version(&result.version_id).expect("new version");
    assert_eq!(version.name, "introduce elena");
    assert_eq!(version.parent_version_id.as_deref(), Some(root.id.as_str()));
    assert!(!version.is_working_set);
    assert_eq!(store.get_working_set("book1").expect("ws").id, root.id);

    let entities = store
        .list_entities(ListEntitiesRequest::new(&result.version_id))
        .expect("entities");
    assert_eq!(entities.len(), 1);
    let elena = &entities[0];
    assert_eq!(elena.logical_id, "elena-x");
    assert_eq!(elena.name, "Elena");
    assert_eq!(elena.entity_type, EntityType::Character);
    assert_eq!(elena.field("level"), Some(&json!(1)));
    assert_eq!(elena.field("traits"), Some(&json!(["brave", "curious"])));
    assert_eq!(elena.field("logical_id"), Some(&json!("elena-x")));

    assert!(
        store
            .list_entities(ListEntitiesRequest::new(&root.id))
            .expect("root entities")
            .is_empty()
    );
}

#[test]
fn updates_copy_on_write_and_inherit_unchanged_fields() {
    let dir = temp_storage_dir("cow");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");

    let v2 = apply(
        &mut store,
        &root.id,
        vec![
            Delta::create(EntityType::Character, "elena-x")
                .field("name", "Elena")
                .field("level", 1),
            Delta::create(EntityType::Location, "harbor").field("name", "Grey Harbor"),
        ],
    );
    let original = store.list_version_entities(&v2).expect("v2 rows");
    let original_elena = original
        .iter()
        .find(|e| e.logical_id == "elena-x")
        .expect("elena row")
        .clone();

    let v3 = apply(
        &mut store,
        &v2,
        vec![Delta::update("elena-x").field("level", 7)],
    );

    let still = store.get_entity(&original_elena.id).expect("original row survives");
    assert_eq!(still, original_elena);

    let view = store
        .list_entities(ListEntitiesRequest::new(&v3))
        .expect("v3 view");
    assert_eq!(view.len(), 2);
    let elena = view.iter().find(|e| e.logical_id == "elena-x").expect("elena");
    assert_ne!(elena.id, original_elena.id);
    assert_eq!(elena.version_id, v3);
    assert_eq!(elena.field("level"), Some(&json!(7)));
    assert_eq!(elena.name, "Elena");
    let harbor = view.iter().find(|e| e.logical_id == "harbor").expect("inherited");
    assert_eq!(harbor.version_id, v2);

    let locations = store
        .list_entities(ListEntitiesRequest::new(&v3).of_type(EntityType::Location))
        .expect("filtered view");
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].logical_id, "harbor");

    assert_eq!(store.list_version_entities(&v3).expect("direct rows").len(), 1);
}

#[test]
fn rejected_batches_leave_no_trace() {
    let dir = temp_storage_dir("rollback");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");

    let err = store
        .apply(ApplyRequest {
            parent_version_id: root.id.clone(),
            deltas: Vec::new(),
            ..ApplyRequest::default()
        })
        .expect_err("empty batch must be rejected");
    assert!(err.is_validation());

    let err = store
        .apply(ApplyRequest {
            parent_version_id: root.id.clone(),
            deltas: vec![
                Delta::create(EntityType::Scene, "opening"),
                Delta {
                    operation: "merge".to_string(),
                    entity_id: Some("opening".to_string()),
                    ..Delta::default()
                },
            ],
            ..ApplyRequest::default()
        })
        .expect_err("unknown operation must be rejected");
    assert!(err.is_validation());

    // Fails inside the transaction, after the first row was written.
    let err = store
        .apply(ApplyRequest {
            parent_version_id: root.id.clone(),
            deltas: vec![
                Delta::create(EntityType::Scene, "opening"),
                Delta::update("never-created").field("x", 1),
            ],
            ..ApplyRequest::default()
        })
        .expect_err("update of unknown logical id must be rejected");
    assert!(matches!(err, StoreError::UnknownLogicalId { .. }));

    let err = store
        .apply(ApplyRequest {
            parent_version_id: "no-such-version".to_string(),
            deltas: vec![Delta::create(EntityType::Scene, "opening")],
            ..ApplyRequest::default()
        })
        .expect_err("unknown parent must be rejected");
    assert!(matches!(err, StoreError::UnknownVersion(_)));

    assert_eq!(store.list_versions("book1").expect("versions").len(), 1);
    assert!(store.entity_history("opening").expect("history").is_empty());
}

#[test]
fn create_of_existing_logical_id_requires_update() {
    let dir = temp_storage_dir("dup-create");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let v2 = apply(
        &mut store,
        &root.id,
        vec![Delta::create(EntityType::Theme, "loss")],
    );

    let err = store
        .apply(ApplyRequest {
            parent_version_id: v2,
            deltas: vec![Delta::create(EntityType::Theme, "loss")],
            ..ApplyRequest::default()
        })
        .expect_err("duplicate create must be rejected");
    assert!(err.is_validation());

    let err = store
        .apply(ApplyRequest {
            parent_version_id: root.id.clone(),
            deltas: vec![
                Delta::create(EntityType::Arc, "redemption"),
                Delta::create(EntityType::Arc, "redemption"),
            ],
            ..ApplyRequest::default()
        })
        .expect_err("duplicate create within one batch must be rejected");
    assert!(err.is_validation());
}

#[test]
fn generated_logical_ids_are_stamped_into_data() {
    let dir = temp_storage_dir("generated");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let v2 = apply(
        &mut store,
        &root.id,
        vec![Delta {
            operation: "create".to_string(),
            entity_type: Some("plot_point".to_string()),
            fields: json!({"title": "The Betrayal"}).as_object().cloned().unwrap(),
            ..Delta::default()
        }],
    );
    let rows = store.list_version_entities(&v2).expect("rows");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].logical_id.is_empty());
    assert_eq!(rows[0].name, "The Betrayal");
    assert_eq!(rows[0].entity_type, EntityType::PlotPoint);
    let stamped = serde_json::Value::String(rows[0].logical_id.clone());
    assert_eq!(rows[0].field("logical_id"), Some(&stamped));
}

#[test]
fn neighbors_follow_logical_ids_and_tombstones() {
    let dir = temp_storage_dir("neighbors");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");

    // `knows` points at an entity created later in the same batch.
    let v2 = apply(
        &mut store,
        &root.id,
        vec![
            Delta::create(EntityType::Character, "elena-x")
                .field("name", "Elena")
                .relationship(RelationshipDelta::create("knows", "mira").property("since", "childhood"))
                .relationship(RelationshipDelta::create("lives_in", "harbor")),
            Delta::create(EntityType::Character, "mira").field("name", "Mira"),
            Delta::create(EntityType::Location, "harbor").field("name", "Grey Harbor"),
        ],
    );

    let all = store
        .get_neighbors_in_version(NeighborsRequest::new(&v2, "elena-x"))
        .expect("neighbors");
    assert_eq!(all.len(), 2);
    assert!(all.iter().all(|n| n.direction == NeighborDirection::Outgoing));

    let incoming = store
        .get_neighbors_in_version(
            NeighborsRequest::new(&v2, "mira").direction(NeighborDirection::Incoming),
        )
        .expect("incoming");
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0].entity.logical_id, "elena-x");
    assert_eq!(incoming[0].relationship.properties.get("since"), Some(&json!("childhood")));

    // Evolving the endpoint keeps the edge pointing at the current row.
    let v3 = apply(
        &mut store,
        &v2,
        vec![Delta::update("mira").field("name", "Mira the Bold")],
    );
    let elena_row = store
        .list_entities(ListEntitiesRequest::new(&v3))
        .expect("view")
        .into_iter()
        .find(|e| e.logical_id == "elena-x")
        .expect("elena");
    let knows = store
        .get_neighbors(&elena_row.id, Some("knows"))
        .expect("neighbors by row");
    // elena's row lives in v2, so the row-based lookup sees v2's mira.
    assert_eq!(knows.len(), 1);
    assert_eq!(knows[0].entity.name, "Mira");
    let knows = store
        .get_neighbors_in_version(NeighborsRequest::new(&v3, "elena-x").relationship_type("knows"))
        .expect("neighbors in v3");
    assert_eq!(knows[0].entity.name, "Mira the Bold");

    let v4 = apply(
        &mut store,
        &v3,
        vec![
            Delta::update("elena-x")
                .relationship(RelationshipDelta::delete("knows", "mira"))
                .relationship(
                    RelationshipDelta {
                        operation: "update".to_string(),
                        ..RelationshipDelta::create("lives_in", "harbor")
                    }
                    .property("since", "year 3"),
                ),
        ],
    );
    let after = store
        .get_neighbors_in_version(NeighborsRequest::new(&v4, "elena-x"))
        .expect("neighbors after delete");
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].entity.logical_id, "harbor");
    assert_eq!(after[0].relationship.properties.get("since"), Some(&json!("year 3")));

    // The parent still sees the edge.
    assert_eq!(
        store
            .get_neighbors_in_version(NeighborsRequest::new(&v3, "elena-x"))
            .expect("v3 neighbors")
            .len(),
        2
    );

    let tombstones = store.list_version_relationships(&v4).expect("v4 rows");
    assert!(tombstones.iter().any(|r| r.deleted && r.relationship_type == "knows"));

    let err = store
        .apply(ApplyRequest {
            parent_version_id: v4.clone(),
            deltas: vec![
                Delta::update("elena-x").relationship(RelationshipDelta::delete("knows", "mira")),
            ],
            ..ApplyRequest::default()
        })
        .expect_err("deleting a deleted edge must fail");
    assert!(matches!(err, StoreError::UnknownRelationship(_)));

    let err = store
        .apply(ApplyRequest {
            parent_version_id: v4.clone(),
            deltas: vec![
                Delta::update("elena-x").relationship(RelationshipDelta::create("fears", "nobody")),
            ],
            ..ApplyRequest::default()
        })
        .expect_err("dangling endpoint must be rejected");
    assert!(matches!(err, StoreError::UnknownLogicalId { .. }));

    let err = store
        .get_neighbors_in_version(NeighborsRequest::new(&v4, "nobody"))
        .expect_err("unknown logical id");
    assert!(err.is_not_found());
}

#[test]
fn diff_and_validate_report_view_changes() {
    let dir = temp_storage_dir("diff");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let v2 = apply(
        &mut store,
        &root.id,
        vec![
            Delta::create(EntityType::Character, "elena-x")
                .field("level", 1)
                .relationship(RelationshipDelta::create("rivals", "mira")),
            Delta::create(EntityType::Character, "mira"),
        ],
    );
    let v3 = apply(
        &mut store,
        &v2,
        vec![
            Delta::update("elena-x")
                .field("level", 2)
                .relationship(RelationshipDelta::delete("rivals", "mira")),
            Delta::create(EntityType::Scene, "duel"),
        ],
    );

    let cancel = CancelToken::new();
    let diff = store.diff_versions(&v2, &v3, &cancel).expect("diff");
    assert_eq!(diff.added_entities.len(), 1);
    assert_eq!(diff.added_entities[0].logical_id, "duel");
    assert_eq!(diff.changed_entities.len(), 1);
    assert_eq!(diff.changed_entities[0].after.field("level"), Some(&json!(2)));
    assert!(diff.removed_entities.is_empty());
    assert_eq!(diff.removed_relationships.len(), 1);
    assert!(diff.added_relationships.is_empty());

    assert!(store.diff_versions(&v3, &v3, &cancel).expect("self diff").is_empty());

    let report = store.validate_version(&v2).expect("validate");
    assert!(report.ok);
    assert_eq!(report.entities, 2);
    assert_eq!(report.relationships, 1);
}

#[test]
fn cancelled_reads_stop_before_walking() {
    let dir = temp_storage_dir("cancel");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let v2 = apply(&mut store, &root.id, vec![Delta::create(EntityType::Scene, "opening")]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let mut request = ListEntitiesRequest::new(&v2);
    request.cancel = cancel.clone();
    let err = store.list_entities(request).expect_err("cancelled read");
    assert!(matches!(err, StoreError::Cancelled));
    assert_eq!(err.code(), "CANCELLED");

    let err = store
        .diff_versions(&root.id, &v2, &cancel)
        .expect_err("cancelled diff");
    assert!(matches!(err, StoreError::Cancelled));
}

#[test]
fn chain_depth_is_bounded_per_handle() {
    let dir = temp_storage_dir("depth");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let mut head = root.id.clone();
    for i in 0..4 {
        head = apply(
            &mut store,
            &head,
            vec![Delta::create(EntityType::Scene, format!("scene-{i}"))],
        );
    }
    assert_eq!(
        store
            .list_entities(ListEntitiesRequest::new(&head))
            .expect("deep view")
            .len(),
        4
    );

    let mut shallow = SqliteStore::open_with_config(StoreConfig::new(&dir).with_max_chain_depth(3))
        .expect("second handle");
    let err = shallow
        .list_entities(ListEntitiesRequest::new(&head))
        .expect_err("five-version chain exceeds depth three");
    assert!(matches!(err, StoreError::ChainDepthExceeded(3)));
}

/// Appends `hops` versions below `tip` in one raw transaction, writing one scene every
/// 1000 hops, and returns the new tip.
fn grow_chain_raw(dir: &std::path::Path, project_id: &str, tip: &str, hops: usize) -> String {
    let mut conn = Connection::open(dir.join("graphwrite.db")).expect("db must open");
    let tx = conn.transaction().expect("raw transaction");
    let mut parent = tip.to_string();
    for i in 0..hops {
        let id = format!("deep-{i}");
        tx.execute(
            "INSERT INTO graph_versions(id, project_id, parent_version_id, name, description, created_at_ms) \
             VALUES (?1, ?2, ?3, ?4, '', ?5)",
            params![id, project_id, parent, format!("hop {i}"), i as i64],
        )
        .expect("version row");
        if i % 1000 == 0 {
            let logical_id = format!("scene-{i}");
            tx.execute(
                "INSERT INTO entities(id, version_id, logical_id, entity_type, name, data_json, created_at_ms, updated_at_ms) \
                 VALUES (?1, ?2, ?3, 'scene', ?3, ?4, ?5, ?5)",
                params![
                    format!("row-{i}"),
                    id,
                    logical_id,
                    json!({ "logical_id": logical_id }).to_string(),
                    i as i64,
                ],
            )
            .expect("entity row");
        }
        parent = id;
    }
    tx.commit().expect("raw commit");
    parent
}

#[test]
fn deep_histories_stay_readable_from_a_cold_handle() {
    let dir = temp_storage_dir("deep-cold");
    let root = {
        let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
        bootstrap(&mut store, "saga")
    };
    let tip = grow_chain_raw(&dir, "saga", &root.id, 5000);

    let mut cold = SqliteStore::open(&dir).expect("cold handle");
    let view = cold
        .list_entities(ListEntitiesRequest::new(&tip))
        .expect("deep view from a cold cache");
    assert_eq!(view.len(), 5);
    assert!(view.iter().any(|e| e.logical_id == "scene-0"));
    assert!(view.iter().any(|e| e.logical_id == "scene-4000"));

    let mut restarted = SqliteStore::open(&dir).expect("second cold handle");
    let child = apply(
        &mut restarted,
        &tip,
        vec![Delta::update("scene-0").field("mood", "tense")],
    );
    let scene = restarted
        .list_entities(ListEntitiesRequest::new(&child))
        .expect("child view")
        .into_iter()
        .find(|e| e.logical_id == "scene-0")
        .expect("scene-0 inherited");
    assert_eq!(scene.field("mood"), Some(&json!("tense")));

    let mut capped = SqliteStore::open_with_config(StoreConfig::new(&dir).with_max_chain_depth(100))
        .expect("capped handle");
    let err = capped
        .list_entities(ListEntitiesRequest::new(&tip))
        .expect_err("explicit cap still applies");
    assert!(matches!(err, StoreError::ChainDepthExceeded(100)));
}

#[test]
fn snapshot_cache_serves_repeated_reads() {
    let dir = temp_storage_dir("cache");
    let mut store = SqliteStore::open(&dir).expect("fresh storage should open");
    let root = bootstrap(&mut store, "book1");
    let v2 = apply(&mut store, &root.id, vec![Delta::create(EntityType::Scene, "opening")]);

    let before = store.snapshot_cache_stats();
    store
        .list_entities(ListEntitiesRequest::new(&v2))
        .expect("first read");
    store
        .list_entities(ListEntitiesRequest::new(&v2))
        .expect("second read");
    let after = store.snapshot_cache_stats();
    assert_eq!(after.hits, before.hits + 2);
    assert!(after.entries >= 2);
}
