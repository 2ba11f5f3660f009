//! # relgraph-store
//!
//! Relational table queries and nested-graph synchronization over a
//! declared data model.
//!
//! The crate has two engines that share one `DataModel`:
//!
//! - **Query compiler**: turns a declarative `TableRequest` (column filters,
//!   a global filter, sorting, pagination) into a parameterized PostgreSQL
//!   row query and count query. Dotted paths such as `project.owner.name`
//!   are resolved to aliased joins; relation quantifiers (`hasAny`,
//!   `hasAll`, `hasChild`) become `EXISTS` subqueries.
//! - **Graph synchronizer**: creates, updates, deletes and restores an
//!   instance together with its nested one-to-many children. Updates are
//!   reconciled with a structural comparator that classifies children as
//!   added, removed, modified or unchanged.
//!
//! ## Features
//!
//! - **Explicit schema**: entity types, attributes and relations are
//!   declared up front, optionally through the `DescribeEntity` trait
//! - **Typed operator filters**: text, number, date, boolean, list and
//!   relation filters selected from the attribute's semantic type
//! - **Soft delete**: per-relation delete columns, with audit stamping
//! - **SQL Injection Prevention**: identifiers are quoted and validated,
//!   values are always bound parameters
//!
//! ## Quick Start
//!
//! ```rust
//! use relgraph_store::{
//!     ColumnDefinition, ColumnType, DataModel, EntityType, FilterFn, QueryCompiler,
//!     RelationDefinition, TableRequest,
//! };
//!
//! let model = DataModel::from_entities([
//!     EntityType::new("Project", "projects")
//!         .attribute(ColumnDefinition::new("name", ColumnType::String))
//!         .relation(RelationDefinition::one_to_many("tasks", "Task")),
//!     EntityType::new("Task", "tasks")
//!         .attribute(ColumnDefinition::new("title", ColumnType::String))
//!         .attribute(ColumnDefinition::new("project_id", ColumnType::String))
//!         .relation(RelationDefinition::many_to_one("project", "Project")),
//! ])
//! .unwrap();
//!
//! let request = TableRequest::new()
//!     .with_column_filter("project.name", FilterFn::StartsWith, "Apollo")
//!     .with_sorting("title", false)
//!     .with_pagination(0, 20);
//!
//! let compiled = QueryCompiler::new(&model, "Task").unwrap().compile(&request);
//! assert!(compiled.select.sql.contains("INNER JOIN \"projects\""));
//! assert!(compiled.invalid_paths.is_empty());
//! ```
//!
//! Executing compiled queries requires a PostgreSQL pool; see `TableStore`.

pub mod config;
pub mod error;
pub mod instance;
pub mod query;
pub mod schema;
pub mod sql;
pub mod store;
pub mod sync;
pub mod types;

// Re-export main types for convenience
pub use config::{
    AuditColumns, RelationConfig, StoreConfig, StoreConfigBuilder, SyncConfig, SyncConfigBuilder,
};
pub use error::{Result, StoreError};
pub use instance::{EntityInstance, InstanceState, Related};
pub use query::{
    CompiledQuery, FilterFn, InvalidPath, Pagination, PathInspector, QueryCompiler,
    RequestInterpreter, Sorting, TableRequest,
};
pub use schema::{Cardinality, DataModel, DescribeEntity, EntityType, JoinTable, RelationDefinition};
pub use store::{TablePage, TableStore};
pub use sync::{
    Comparator, CompareOptions, DeleteMode, GraphSynchronizer, PayloadSchema, Record,
    ReconcileReport, SyncOutcome,
};
pub use types::{ColumnDefinition, ColumnType, SemanticType};

// Re-export SQL utilities for advanced users
pub use sql::condition::{build_condition_clause, build_order_by_clause};
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
