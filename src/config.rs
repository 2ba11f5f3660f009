//! Configuration for the table store and the graph synchronizer
//!
//! Both configurations follow the same builder pattern: start from
//! `builder(..)`, chain setters, finish with `build()`.

use std::collections::{BTreeSet, HashMap};

/// Default recursion limit for graph synchronization
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Default soft-delete column used by delete/restore when no override is given
pub const DEFAULT_DELETE_COLUMN: &str = "deleted";

/// Names of the audit columns stamped on create/update/delete/restore.
///
/// Setting a name to `None` disables stamping of that column.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditColumns {
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
}

impl Default for AuditColumns {
    fn default() -> Self {
        Self {
            created_at: Some("created_at".to_string()),
            updated_at: Some("updated_at".to_string()),
            created_by: Some("created_by".to_string()),
            updated_by: Some("updated_by".to_string()),
        }
    }
}

impl AuditColumns {
    /// All configured audit column names
    pub fn names(&self) -> Vec<&str> {
        [
            &self.created_at,
            &self.updated_at,
            &self.created_by,
            &self.updated_by,
        ]
        .into_iter()
        .filter_map(|c| c.as_deref())
        .collect()
    }

    /// Whether `field` is one of the audit columns
    pub fn contains(&self, field: &str) -> bool {
        self.names().contains(&field)
    }
}

/// Per-relation reconciliation settings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationConfig {
    /// Fields identifying a child across old and new lists. Empty means full-record identity.
    pub key_fields: BTreeSet<String>,
    /// Fields ignored by comparison and never written back on modification
    pub exclude_fields: BTreeSet<String>,
    /// Soft-delete column for this relation's children
    pub deleted_column: Option<String>,
}

impl RelationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn deleted_column(mut self, column: impl Into<String>) -> Self {
        self.deleted_column = Some(column.into());
        self
    }
}

/// Configuration for the graph synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Relation settings keyed by relation name
    pub relations: HashMap<String, RelationConfig>,
    /// Soft-delete column used when a relation has no override
    pub default_deleted_column: String,
    /// Audit column names
    pub audit_columns: AuditColumns,
    /// Maximum recursion depth (default: 10)
    pub max_depth: usize,
    /// Actor recorded in `created_by` / `updated_by`
    pub actor: Option<serde_json::Value>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfigBuilder::new().build()
    }
}

impl SyncConfig {
    /// Create a new configuration builder
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::new()
    }

    /// Settings for `relation`, or the empty default
    pub fn relation(&self, relation: &str) -> RelationConfig {
        self.relations.get(relation).cloned().unwrap_or_default()
    }
}

/// Builder for SyncConfig
#[derive(Debug)]
pub struct SyncConfigBuilder {
    relations: HashMap<String, RelationConfig>,
    default_deleted_column: String,
    audit_columns: AuditColumns,
    max_depth: usize,
    actor: Option<serde_json::Value>,
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            relations: HashMap::new(),
            default_deleted_column: DEFAULT_DELETE_COLUMN.to_string(),
            audit_columns: AuditColumns::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            actor: None,
        }
    }

    /// Configure one relation by name
    pub fn relation(mut self, name: impl Into<String>, config: RelationConfig) -> Self {
        self.relations.insert(name.into(), config);
        self
    }

    /// Set the default soft-delete column (default: "deleted")
    pub fn default_deleted_column(mut self, column: impl Into<String>) -> Self {
        self.default_deleted_column = column.into();
        self
    }

    /// Replace the audit column names
    pub fn audit_columns(mut self, columns: AuditColumns) -> Self {
        self.audit_columns = columns;
        self
    }

    /// Disable all audit stamping
    pub fn without_audit_columns(mut self) -> Self {
        self.audit_columns = AuditColumns {
            created_at: None,
            updated_at: None,
            created_by: None,
            updated_by: None,
        };
        self
    }

    /// Set the maximum recursion depth (default: 10)
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Set the actor recorded in audit columns
    pub fn actor(mut self, actor: impl Into<serde_json::Value>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> SyncConfig {
        SyncConfig {
            relations: self.relations,
            default_deleted_column: self.default_deleted_column,
            audit_columns: self.audit_columns,
            max_depth: self.max_depth,
            actor: self.actor,
        }
    }
}

/// Configuration for the table store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Maximum pool connections (default: 5)
    pub max_connections: u32,
    /// Rows with this boolean column set are hidden from table queries
    pub soft_delete_column: Option<String>,
}

impl StoreConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> StoreConfigBuilder {
        StoreConfigBuilder::new(database_url)
    }
}

/// Builder for StoreConfig
#[derive(Debug)]
pub struct StoreConfigBuilder {
    database_url: String,
    max_connections: u32,
    soft_delete_column: Option<String>,
}

impl StoreConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_connections: 5,
            soft_delete_column: None,
        }
    }

    /// Set the maximum number of pooled connections (default: 5)
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Hide rows whose `column` is true
    pub fn soft_delete_column(mut self, column: impl Into<String>) -> Self {
        self.soft_delete_column = Some(column.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> StoreConfig {
        StoreConfig {
            database_url: self.database_url,
            max_connections: self.max_connections,
            soft_delete_column: self.soft_delete_column,
        }
    }
}
