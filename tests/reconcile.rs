//! End-to-end reconciliation tests for the graph synchronizer
//!
//! These tests build instance graphs in memory; no database is needed.

use relgraph_store::sync::FieldChange;
use relgraph_store::{
    ColumnDefinition, ColumnType, Comparator, CompareOptions, DataModel, DeleteMode,
    EntityInstance, EntityType, GraphSynchronizer, JoinTable, PayloadSchema, Record,
    RelationConfig, RelationDefinition, StoreError, SyncConfig,
};
use serde_json::{json, Value};

fn model() -> DataModel {
    DataModel::from_entities([
        EntityType::new("User", "users").attribute(ColumnDefinition::new("name", ColumnType::String)),
        EntityType::new("Project", "projects")
            .attribute(ColumnDefinition::new("name", ColumnType::String).not_null())
            .attribute(ColumnDefinition::new("owner_id", ColumnType::String))
            .attribute(ColumnDefinition::new("deleted", ColumnType::Boolean))
            .attribute(ColumnDefinition::new("created_at", ColumnType::Timestamp))
            .attribute(ColumnDefinition::new("updated_at", ColumnType::Timestamp))
            .attribute(ColumnDefinition::new("updated_by", ColumnType::String))
            .relation(RelationDefinition::one_to_many("tasks", "Task"))
            .relation(RelationDefinition::many_to_one("owner", "User"))
            .relation(RelationDefinition::one_to_one("charter", "Charter"))
            .relation(RelationDefinition::many_to_many(
                "members",
                "User",
                JoinTable::new("project_members", "project_id", "user_id"),
            )),
        EntityType::new("Task", "tasks")
            .attribute(ColumnDefinition::new("title", ColumnType::String).not_null())
            .attribute(ColumnDefinition::new("estimate", ColumnType::Integer))
            .attribute(ColumnDefinition::new("deleted", ColumnType::Boolean))
            .attribute(ColumnDefinition::new("archived", ColumnType::Boolean))
            .attribute(ColumnDefinition::new("updated_at", ColumnType::Timestamp))
            .attribute(ColumnDefinition::new("project_id", ColumnType::String))
            .relation(RelationDefinition::one_to_many("comments", "Comment")),
        EntityType::new("Comment", "comments")
            .attribute(ColumnDefinition::new("body", ColumnType::String))
            .attribute(ColumnDefinition::new("hidden", ColumnType::Boolean))
            .attribute(ColumnDefinition::new("task_id", ColumnType::String)),
        EntityType::new("Charter", "charters")
            .attribute(ColumnDefinition::new("text", ColumnType::String))
            .attribute(ColumnDefinition::new("project_id", ColumnType::String)),
    ])
    .expect("valid model")
}

fn keyed_config() -> SyncConfig {
    SyncConfig::builder()
        .relation("tasks", RelationConfig::new().key_fields(["id"]))
        .build()
}

fn soft_config() -> SyncConfig {
    SyncConfig::builder()
        .relation(
            "tasks",
            RelationConfig::new().key_fields(["id"]).deleted_column("archived"),
        )
        .relation("comments", RelationConfig::new().deleted_column("hidden"))
        .actor("u1")
        .build()
}

fn project(model: &DataModel, tasks: Value) -> EntityInstance {
    EntityInstance::from_value(
        model,
        "Project",
        &json!({"id": "p1", "name": "Apollo", "deleted": false, "tasks": tasks}),
    )
    .expect("valid instance")
}

fn ids(instance: &EntityInstance, relation: &str) -> Vec<Value> {
    instance
        .children(relation)
        .iter()
        .map(|c| c.get("id").cloned().unwrap_or(Value::Null))
        .collect()
}

// ============================================================================
// Comparator
// ============================================================================

#[test]
fn test_comparator_reports_changed_field() {
    let old = vec![Record::new("Task").field("id", 1).field("title", "A")];
    let new = vec![Record::new("Task").field("id", 1).field("title", "B")];
    let result = Comparator::new(old, new, CompareOptions::new().key_fields(["id"])).unwrap();

    assert!(result.added().is_empty());
    assert!(result.removed().is_empty());
    assert_eq!(result.modified().len(), 1);
    let item = &result.modified()[0];
    assert_eq!(item.key.get("id"), Some(&json!(1)));
    assert_eq!(
        item.changed_fields.get("title"),
        Some(&FieldChange {
            old: json!("A"),
            new: json!("B"),
        })
    );
}

// ============================================================================
// Update / reconcile
// ============================================================================

#[test]
fn test_removed_child_is_hard_deleted_without_delete_column() {
    let model = model();
    let config = keyed_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let existing = project(
        &model,
        json!([
            {"id": "t1", "title": "A", "project_id": "p1"},
            {"id": "t2", "title": "B", "project_id": "p1"},
            {"id": "t3", "title": "C", "project_id": "p1"}
        ]),
    );
    let outcome = sync
        .update(
            existing,
            &json!({"tasks": [{"id": "t1", "title": "A"}, {"id": "t2", "title": "B"}]}),
            &schema,
        )
        .unwrap();

    assert_eq!(ids(&outcome.instance, "tasks"), vec![json!("t1"), json!("t2")]);
    assert_eq!(outcome.hard_deleted.len(), 1);
    assert_eq!(outcome.hard_deleted[0].get("id"), Some(&json!("t3")));

    let report = &outcome.reports[0];
    assert_eq!(report.relation, "tasks");
    assert_eq!(report.kept, 2);
    assert_eq!(report.hard_deleted, 1);
    assert!(outcome.instance.has_value("updated_at"));
}

#[test]
fn test_soft_delete_keeps_flagged_children() {
    let model = model();
    let config = soft_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let existing = project(
        &model,
        json!([
            {"id": "t0", "title": "old", "archived": true},
            {"id": "t1", "title": "A", "archived": false},
            {"id": "t2", "title": "B", "archived": false}
        ]),
    );
    let outcome = sync
        .update(existing, &json!({"tasks": [{"id": "t1", "title": "A2"}]}), &schema)
        .unwrap();

    assert!(outcome.hard_deleted.is_empty());
    let tasks = outcome.instance.children("tasks");
    assert_eq!(ids(&outcome.instance, "tasks"), vec![json!("t0"), json!("t1"), json!("t2")]);
    assert_eq!(tasks[0].get("updated_at"), None);
    assert_eq!(tasks[1].get("title"), Some(&json!("A2")));
    assert!(tasks[1].has_value("updated_at"));
    assert!(tasks[2].is_flagged("archived"));
    assert!(tasks[2].has_value("updated_at"));

    let report = &outcome.reports[0];
    assert_eq!(report.already_deleted, 1);
    assert_eq!(report.mutated, 1);
    assert_eq!(report.soft_deleted, 1);
    assert_eq!(outcome.instance.get("updated_by"), Some(&json!("u1")));
}

#[test]
fn test_added_child_gets_key_and_parent_reference() {
    let model = model();
    let config = keyed_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let existing = project(&model, json!([{"id": "t1", "title": "A"}]));
    let outcome = sync
        .update(
            existing,
            &json!({"tasks": [{"id": "t1", "title": "A"}, {"title": "new", "estimate": 3}]}),
            &schema,
        )
        .unwrap();

    let tasks = outcome.instance.children("tasks");
    assert_eq!(tasks.len(), 2);
    let created = &tasks[1];
    assert!(created.is_new());
    assert_eq!(created.get("project_id"), Some(&json!("p1")));
    assert_eq!(created.get("estimate"), Some(&json!(3)));
    let id = created.get("id").and_then(Value::as_str).unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
    assert_eq!(outcome.reports[0].created, 1);
}

#[test]
fn test_reapplying_payload_changes_nothing() {
    let model = model();
    let config = soft_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);
    let payload = json!({"name": "Apollo", "tasks": [
        {"id": "t1", "title": "A2", "estimate": 1},
        {"id": "t2", "title": "B"}
    ]});

    let existing = project(&model, json!([{"id": "t1", "title": "A"}, {"id": "t2", "title": "B"}]));
    let first = sync.update(existing, &payload, &schema).unwrap();
    let second = sync.update(first.instance, &payload, &schema).unwrap();

    let report = &second.reports[0];
    assert_eq!(report.kept, 2);
    assert_eq!(report.mutated + report.created + report.soft_deleted + report.hard_deleted, 0);
    assert!(second.hard_deleted.is_empty());
}

#[test]
fn test_modified_child_reconciles_nested_list() {
    let model = model();
    let config = soft_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let existing = project(
        &model,
        json!([{
            "id": "t1",
            "title": "A",
            "comments": [
                {"id": "c1", "body": "keep", "task_id": "t1"},
                {"id": "c2", "body": "drop", "task_id": "t1"}
            ]
        }]),
    );
    let outcome = sync
        .update(
            existing,
            &json!({"tasks": [{
                "id": "t1",
                "title": "A",
                "comments": [{"id": "c1", "body": "keep"}, {"body": "added"}]
            }]}),
            &schema,
        )
        .unwrap();

    let relations: Vec<&str> = outcome.reports.iter().map(|r| r.relation.as_str()).collect();
    assert_eq!(relations, vec!["comments", "tasks"]);

    let comments = outcome.instance.children("tasks")[0].children("comments");
    assert_eq!(comments.len(), 3);
    assert_eq!(comments[0].get("id"), Some(&json!("c1")));
    assert_eq!(comments[1].get("body"), Some(&json!("added")));
    assert_eq!(comments[1].get("task_id"), Some(&json!("t1")));
    assert_eq!(comments[2].get("id"), Some(&json!("c2")));
    assert!(comments[2].is_flagged("hidden"));
}

#[test]
fn test_update_skips_many_to_one() {
    let model = model();
    let config = keyed_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let outcome = sync
        .update(
            project(&model, json!([])),
            &json!({"name": "Renamed", "owner": {"id": "u9"}}),
            &schema,
        )
        .unwrap();
    assert_eq!(outcome.instance.get("name"), Some(&json!("Renamed")));
    assert!(outcome.instance.relation("owner").is_none());
    assert!(outcome.reports.is_empty());
}

#[test]
fn test_update_rejects_unsupported_relations() {
    let model = model();
    let config = keyed_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let err = sync
        .update(project(&model, json!([])), &json!({"members": []}), &schema)
        .unwrap_err();
    assert!(matches!(err, StoreError::UnsupportedRelation(_)));

    let err = sync
        .update(project(&model, json!([])), &json!({"charter": {"text": "x"}}), &schema)
        .unwrap_err();
    assert!(matches!(err, StoreError::NotImplemented(_)));
}

#[test]
fn test_update_rejects_unloaded_relations() {
    let model = model();
    let config = soft_config();
    let schema = PayloadSchema::from_entity(&model, "Project", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    // comments of t1 were never loaded
    let existing = project(&model, json!([{"id": "t1", "title": "A"}]));
    let err = sync
        .update(
            existing.clone(),
            &json!({"tasks": [{"id": "t1", "title": "A", "comments": [{"id": "c1", "body": "x"}]}]}),
            &schema,
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let outcome = sync
        .update(existing, &json!({"tasks": [{"id": "t1", "title": "A"}]}), &schema)
        .unwrap();
    assert_eq!(outcome.reports[0].kept, 1);
    assert!(outcome.instance.children("tasks")[0].relation("comments").is_none());

    let bare = EntityInstance::from_value(&model, "Project", &json!({"id": "p1", "name": "Apollo"}))
        .unwrap();
    let err = sync.update(bare, &json!({"tasks": []}), &schema).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

fn category_model() -> DataModel {
    DataModel::from_entities([EntityType::new("Category", "categories")
        .attribute(ColumnDefinition::new("name", ColumnType::String))
        .attribute(ColumnDefinition::new("parent_id", ColumnType::String))
        .relation(RelationDefinition::one_to_many("children", "Category").foreign_key("parent_id"))])
    .expect("valid model")
}

#[test]
fn test_update_reconciles_self_referential_children() {
    let model = category_model();
    let config = SyncConfig::builder()
        .relation("children", RelationConfig::new().key_fields(["id"]))
        .build();
    let schema = PayloadSchema::from_entity(&model, "Category", &config).unwrap();
    let sync = GraphSynchronizer::new(&model, config);

    let root = EntityInstance::from_value(
        &model,
        "Category",
        &json!({"id": "root", "name": "Root", "children": [
            {"id": "c1", "name": "a", "parent_id": "root", "children": []},
            {"id": "c2", "name": "b", "parent_id": "root", "children": []}
        ]}),
    )
    .unwrap();

    let outcome = sync
        .update(root, &json!({"children": [{"id": "c2", "name": "renamed"}]}), &schema)
        .unwrap();
    assert_eq!(ids(&outcome.instance, "children"), vec![json!("c2")]);
    assert_eq!(outcome.instance.children("children")[0].get("name"), Some(&json!("renamed")));
    assert_eq!(outcome.hard_deleted.len(), 1);
    assert_eq!(outcome.hard_deleted[0].get("id"), Some(&json!("c1")));

    let outcome = sync
        .update(
            outcome.instance,
            &json!({"children": [{"id": "c2", "name": "renamed", "children": [{"name": "leaf"}]}]}),
            &schema,
        )
        .unwrap();
    let relations: Vec<&str> = outcome.reports.iter().map(|r| r.relation.as_str()).collect();
    assert_eq!(relations, vec!["children", "children"]);
    let leaves = outcome.instance.children("children")[0].children("children");
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].get("parent_id"), Some(&json!("c2")));
    assert!(leaves[0].is_new());
}

// ============================================================================
// Create
// ============================================================================

#[test]
fn test_create_builds_nested_graph() {
    let model = model();
    let sync = GraphSynchronizer::new(&model, SyncConfig::default());

    let outcome = sync
        .create(
            "Project",
            &json!({
                "name": "Gemini",
                "tasks": [{"title": "a", "comments": [{"body": "c"}]}, {"title": "b"}]
            }),
        )
        .unwrap();

    let project = &outcome.instance;
    assert!(project.is_new());
    assert!(project.has_value("created_at"));
    let project_id = project.get("id").cloned().unwrap();

    let tasks = project.children("tasks");
    assert_eq!(tasks.len(), 2);
    assert!(tasks.iter().all(|t| t.get("project_id") == Some(&project_id)));
    let comments = tasks[0].children("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].get("task_id"), tasks[0].get("id"));
}

#[test]
fn test_create_stops_at_max_depth() {
    let model = model();
    let sync = GraphSynchronizer::new(&model, SyncConfig::builder().max_depth(1).build());

    let outcome = sync
        .create(
            "Project",
            &json!({"name": "Gemini", "tasks": [{"title": "a", "comments": [{"body": "c"}]}]}),
        )
        .unwrap();

    let tasks = outcome.instance.children("tasks");
    assert_eq!(tasks.len(), 1);
    assert!(tasks[0].relation("comments").is_none());
}

#[test]
fn test_create_rejects_bad_payloads() {
    let model = model();
    let sync = GraphSynchronizer::new(&model, SyncConfig::default());

    let err = sync
        .create("Project", &json!({"name": "x", "color": "red"}))
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    let err = sync
        .create("Project", &json!({"name": "x", "charter": {"text": "t"}}))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotImplemented(_)));

    let err = sync.create("Project", &json!({"name": "x", "tasks": 3})).unwrap_err();
    assert!(matches!(err, StoreError::Conversion(_)));
}

// ============================================================================
// Delete / restore
// ============================================================================

fn loaded_project(model: &DataModel) -> EntityInstance {
    project(
        model,
        json!([{"id": "t1", "title": "A", "comments": [{"id": "c1", "body": "x"}]}]),
    )
}

#[test]
fn test_soft_delete_cascades_with_relation_columns() {
    let model = model();
    let sync = GraphSynchronizer::new(&model, soft_config());

    let outcome = sync.delete(loaded_project(&model), DeleteMode::Soft).unwrap();
    let project = &outcome.instance;
    assert!(project.is_flagged("deleted"));
    let task = &project.children("tasks")[0];
    assert!(task.is_flagged("archived"));
    assert!(!task.is_flagged("deleted"));
    assert!(task.children("comments")[0].is_flagged("hidden"));
    assert!(outcome.hard_deleted.is_empty());

    let restored = sync.restore(outcome.instance, DeleteMode::Soft).unwrap();
    let project = &restored.instance;
    assert_eq!(project.get("deleted"), Some(&json!(false)));
    assert_eq!(project.children("tasks")[0].get("archived"), Some(&json!(false)));
}

#[test]
fn test_soft_delete_requires_column() {
    let model = model();
    let config = SyncConfig::builder()
        .relation("tasks", RelationConfig::new().deleted_column("archived"))
        .build();
    let sync = GraphSynchronizer::new(&model, config);

    // comments inherit "archived", which Comment does not declare
    let err = sync.delete(loaded_project(&model), DeleteMode::Soft).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn test_hard_delete_lists_children_first() {
    let model = model();
    let sync = GraphSynchronizer::new(&model, soft_config());

    let outcome = sync.delete(loaded_project(&model), DeleteMode::Hard).unwrap();
    let deleted: Vec<&str> = outcome
        .hard_deleted
        .iter()
        .map(|i| i.entity())
        .collect();
    assert_eq!(deleted, vec!["Comment", "Task", "Project"]);

    let err = sync.restore(loaded_project(&model), DeleteMode::Hard).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}
