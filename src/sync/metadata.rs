use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::config::{AuditColumns, SyncConfig};
use crate::error::{Result, StoreError};
use crate::instance::EntityInstance;
use crate::schema::EntityType;

/// Stamps audit columns at create/update/delete/restore transitions.
///
/// Holds no state of its own. A column is only written when the entity type
/// declares it; actor columns are only written when an actor is configured.
#[derive(Debug, Clone, Copy)]
pub struct MetadataStamper<'a> {
    columns: &'a AuditColumns,
    actor: Option<&'a Value>,
}

impl<'a> MetadataStamper<'a> {
    pub fn new(columns: &'a AuditColumns, actor: Option<&'a Value>) -> Self {
        Self { columns, actor }
    }

    pub fn from_config(config: &'a SyncConfig) -> Self {
        Self::new(&config.audit_columns, config.actor.as_ref())
    }

    /// Set `created_at` unless already present, and `created_by`
    pub fn creation(&self, instance: &mut EntityInstance, entity: &EntityType) {
        if let Some(column) = self.column(entity, &self.columns.created_at) {
            if !instance.has_value(column) {
                instance.set(column, now());
            }
        }
        if let (Some(column), Some(actor)) = (self.column(entity, &self.columns.created_by), self.actor) {
            instance.set(column, actor.clone());
        }
        debug!(entity = %entity.name, "Stamped creation metadata");
    }

    /// Refresh `updated_at` and `updated_by`
    pub fn update(&self, instance: &mut EntityInstance, entity: &EntityType) {
        if let Some(column) = self.column(entity, &self.columns.updated_at) {
            instance.set(column, now());
        }
        if let (Some(column), Some(actor)) = (self.column(entity, &self.columns.updated_by), self.actor) {
            instance.set(column, actor.clone());
        }
    }

    /// Set the soft-delete flag, then stamp the update
    pub fn soft_delete(&self, instance: &mut EntityInstance, entity: &EntityType, column: &str) -> Result<()> {
        self.flag(instance, entity, column, true)
    }

    /// Clear the soft-delete flag, then stamp the update
    pub fn restore(&self, instance: &mut EntityInstance, entity: &EntityType, column: &str) -> Result<()> {
        self.flag(instance, entity, column, false)
    }

    fn flag(&self, instance: &mut EntityInstance, entity: &EntityType, column: &str, value: bool) -> Result<()> {
        if !entity.has_attribute(column) {
            return Err(StoreError::validation(format!(
                "{} has no {} column",
                entity.name, column
            )));
        }
        instance.set(column, value);
        self.update(instance, entity);
        debug!(entity = %entity.name, column = %column, value, "Set soft-delete flag");
        Ok(())
    }

    fn column<'c>(&self, entity: &EntityType, name: &'c Option<String>) -> Option<&'c str> {
        name.as_deref().filter(|c| entity.has_attribute(c))
    }
}

fn now() -> Value {
    Value::String(Utc::now().to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDefinition, ColumnType};
    use serde_json::json;

    fn entity() -> EntityType {
        EntityType::new("Comment", "comments")
            .attribute(ColumnDefinition::new("deleted", ColumnType::Boolean))
            .attribute(ColumnDefinition::new("created_at", ColumnType::Timestamp))
            .attribute(ColumnDefinition::new("updated_at", ColumnType::Timestamp))
            .attribute(ColumnDefinition::new("updated_by", ColumnType::String))
    }

    #[test]
    fn test_creation_keeps_existing_timestamp() {
        let config = SyncConfig::builder().actor("u1").build();
        let stamper = MetadataStamper::from_config(&config);

        let mut fresh = EntityInstance::new("Comment");
        stamper.creation(&mut fresh, &entity());
        assert!(fresh.has_value("created_at"));
        assert_eq!(fresh.get("created_by"), None);

        let mut given = EntityInstance::new("Comment").with_field("created_at", "2024-01-01T00:00:00Z");
        stamper.creation(&mut given, &entity());
        assert_eq!(given.get("created_at"), Some(&json!("2024-01-01T00:00:00Z")));
    }

    #[test]
    fn test_update_sets_actor() {
        let config = SyncConfig::builder().actor("u1").build();
        let mut c = EntityInstance::new("Comment");
        MetadataStamper::from_config(&config).update(&mut c, &entity());
        assert!(c.has_value("updated_at"));
        assert_eq!(c.get("updated_by"), Some(&json!("u1")));

        let config = SyncConfig::builder().without_audit_columns().build();
        let mut c = EntityInstance::new("Comment");
        MetadataStamper::from_config(&config).update(&mut c, &entity());
        assert!(c.fields().is_empty());
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let config = SyncConfig::default();
        let stamper = MetadataStamper::from_config(&config);
        let mut c = EntityInstance::new("Comment");

        stamper.soft_delete(&mut c, &entity(), "deleted").unwrap();
        assert!(c.is_flagged("deleted"));
        assert!(c.has_value("updated_at"));

        stamper.restore(&mut c, &entity(), "deleted").unwrap();
        assert_eq!(c.get("deleted"), Some(&json!(false)));

        let err = stamper.soft_delete(&mut c, &entity(), "archived").unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
