//! DDL generation for registered entity types
//!
//! Generates PostgreSQL statements that create the tables of a `DataModel`:
//! one table per entity type, one association table per many-to-many
//! relation, and foreign key constraints added once every table exists.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::query::inspector::{Link, PathInspector};
use crate::schema::{DataModel, EntityType, JoinTable};
use crate::sql::sanitize::quote_identifier;
use crate::types::ColumnDefinition;

/// A foreign key constraint: `table.column -> ref_table.ref_column`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct ForeignKey {
    table: String,
    column: String,
    ref_table: String,
    ref_column: String,
}

/// DDL generator for the tables of a data model
pub struct DdlGenerator<'a> {
    model: &'a DataModel,
}

impl<'a> DdlGenerator<'a> {
    pub fn new(model: &'a DataModel) -> Self {
        Self { model }
    }

    /// Generate CREATE TABLE for `entity`.
    ///
    /// The primary key column is declared `PRIMARY KEY`; every other
    /// attribute keeps its own constraints.
    pub fn generate_create_table(&self, entity: &str) -> Result<String> {
        let entity = self.model.entity(entity)?;
        let column_defs = entity
            .attributes
            .iter()
            .map(|col| {
                if col.name == entity.primary_key {
                    format!(
                        "{} {} PRIMARY KEY",
                        quote_identifier(&col.name),
                        col.column_type.to_sql_type(&col.name)
                    )
                } else {
                    Self::format_column_definition(col)
                }
            })
            .collect::<Vec<_>>();

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(&entity.table_name),
            column_defs.join(", ")
        ))
    }

    /// Generate DROP TABLE for `entity`
    pub fn generate_drop_table(&self, entity: &str) -> Result<String> {
        let entity = self.model.entity(entity)?;
        Ok(format!(
            "DROP TABLE IF EXISTS {} CASCADE",
            quote_identifier(&entity.table_name)
        ))
    }

    /// Generate CREATE TABLE for the association table of a many-to-many relation
    pub fn generate_join_table(
        &self,
        owner: &EntityType,
        target: &EntityType,
        through: &JoinTable,
    ) -> String {
        let source_type = owner.primary_key_type().to_sql_type(&through.source_column);
        let target_type = target.primary_key_type().to_sql_type(&through.target_column);
        format!(
            "CREATE TABLE IF NOT EXISTS {table} ({source} {source_type} NOT NULL, {target} {target_type} NOT NULL, PRIMARY KEY ({source}, {target}))",
            table = quote_identifier(&through.table),
            source = quote_identifier(&through.source_column),
            target = quote_identifier(&through.target_column),
        )
    }

    /// Generate ALTER TABLE ... ADD FOREIGN KEY for every relation of the model.
    ///
    /// A constraint is only emitted when the referencing column is a declared
    /// attribute; relations seen from both sides yield one constraint.
    pub fn generate_foreign_keys(&self) -> Result<Vec<String>> {
        let inspector = PathInspector::new(self.model);
        let mut keys = BTreeSet::new();

        for owner in self.model.entities() {
            for rel in &owner.relations {
                let target = self.model.entity(&rel.target)?;
                match inspector.link(owner, rel)? {
                    Link::Direct {
                        owner_column,
                        target_column,
                    } => {
                        if owner_column != owner.primary_key && owner.has_attribute(&owner_column) {
                            keys.insert(ForeignKey {
                                table: owner.table_name.clone(),
                                column: owner_column,
                                ref_table: target.table_name.clone(),
                                ref_column: target_column,
                            });
                        } else if target_column != target.primary_key
                            && target.has_attribute(&target_column)
                        {
                            keys.insert(ForeignKey {
                                table: target.table_name.clone(),
                                column: target_column,
                                ref_table: owner.table_name.clone(),
                                ref_column: owner_column,
                            });
                        }
                    }
                    Link::Through {
                        join_table,
                        owner_key,
                        target_key,
                    } => {
                        keys.insert(ForeignKey {
                            table: join_table.table.clone(),
                            column: join_table.source_column.clone(),
                            ref_table: owner.table_name.clone(),
                            ref_column: owner_key,
                        });
                        keys.insert(ForeignKey {
                            table: join_table.table.clone(),
                            column: join_table.target_column.clone(),
                            ref_table: target.table_name.clone(),
                            ref_column: target_key,
                        });
                    }
                }
            }
        }

        Ok(keys.iter().map(Self::format_foreign_key).collect())
    }

    /// Every statement needed to create the model's schema, in execution order:
    /// entity tables, association tables, then foreign keys
    pub fn generate_schema(&self) -> Result<Vec<String>> {
        let mut statements = Vec::new();
        for entity in self.model.entities() {
            statements.push(self.generate_create_table(&entity.name)?);
        }

        let mut join_tables = BTreeSet::new();
        for owner in self.model.entities() {
            for rel in &owner.relations {
                if let Some(through) = &rel.through {
                    if join_tables.insert(through.table.clone()) {
                        let target = self.model.entity(&rel.target)?;
                        statements.push(self.generate_join_table(owner, target, through));
                    }
                }
            }
        }

        statements.extend(self.generate_foreign_keys()?);
        Ok(statements)
    }

    fn format_foreign_key(key: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            quote_identifier(&key.table),
            quote_identifier(&format!("fk_{}_{}", key.table, key.column)),
            quote_identifier(&key.column),
            quote_identifier(&key.ref_table),
            quote_identifier(&key.ref_column)
        )
    }

    /// Format a single column definition for CREATE TABLE
    pub fn format_column_definition(col: &ColumnDefinition) -> String {
        let mut parts = vec![
            quote_identifier(&col.name),
            col.column_type.to_sql_type(&col.name),
        ];

        // UNIQUE constraint
        if col.unique {
            parts.push("UNIQUE".to_string());
        }

        // NOT NULL constraint
        if !col.nullable {
            parts.push("NOT NULL".to_string());
        }

        // DEFAULT value
        if let Some(default) = &col.default_value {
            parts.push(format!("DEFAULT {}", default));
        }

        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::schema::RelationDefinition;
    use crate::types::ColumnType;

    fn model() -> DataModel {
        DataModel::from_entities([
            EntityType::new("Project", "projects")
                .attribute(ColumnDefinition::new("name", ColumnType::String).not_null())
                .relation(RelationDefinition::one_to_many("tasks", "Task"))
                .relation(RelationDefinition::many_to_many(
                    "members",
                    "User",
                    JoinTable::new("project_members", "project_id", "user_id"),
                )),
            EntityType::new("Task", "tasks")
                .attribute(ColumnDefinition::new("title", ColumnType::String).unique().not_null())
                .attribute(ColumnDefinition::new("estimate", ColumnType::decimal(10, 2)).default("0.00"))
                .attribute(ColumnDefinition::new("deleted", ColumnType::Boolean).default("FALSE"))
                .attribute(ColumnDefinition::new("project_id", ColumnType::String))
                .relation(RelationDefinition::many_to_one("project", "Project").back_populates("tasks")),
            EntityType::new("User", "users")
                .primary_key("user_no")
                .attribute(ColumnDefinition::new("user_no", ColumnType::Integer).not_null()),
        ])
        .unwrap()
    }

    // ==================== CREATE TABLE Tests ====================

    #[test]
    fn test_generate_create_table_columns() {
        let model = model();
        let ddl = DdlGenerator::new(&model).generate_create_table("Task").unwrap();

        assert!(ddl.starts_with("CREATE TABLE IF NOT EXISTS \"tasks\" ("));
        assert!(ddl.contains("\"id\" TEXT PRIMARY KEY"));
        assert!(ddl.contains("\"title\" TEXT UNIQUE NOT NULL"));
        assert!(ddl.contains("\"estimate\" NUMERIC(10,2) DEFAULT 0.00"));
        assert!(ddl.contains("\"deleted\" BOOLEAN DEFAULT FALSE"));
        assert!(ddl.contains("\"project_id\" TEXT"));
    }

    #[test]
    fn test_generate_create_table_explicit_primary_key() {
        let model = model();
        let ddl = DdlGenerator::new(&model).generate_create_table("User").unwrap();
        assert_eq!(
            ddl,
            "CREATE TABLE IF NOT EXISTS \"users\" (\"user_no\" BIGINT PRIMARY KEY)"
        );
    }

    #[test]
    fn test_generate_create_table_unknown_entity() {
        let model = model();
        let err = DdlGenerator::new(&model).generate_create_table("Nope").unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound(_)));
    }

    #[test]
    fn test_generate_drop_table() {
        let model = model();
        assert_eq!(
            DdlGenerator::new(&model).generate_drop_table("Project").unwrap(),
            "DROP TABLE IF EXISTS \"projects\" CASCADE"
        );
    }

    // ==================== Relation Tests ====================

    #[test]
    fn test_generate_foreign_keys_deduplicates_both_sides() {
        let model = model();
        let keys = DdlGenerator::new(&model).generate_foreign_keys().unwrap();

        let task_fk = "ALTER TABLE \"tasks\" ADD CONSTRAINT \"fk_tasks_project_id\" FOREIGN KEY (\"project_id\") REFERENCES \"projects\" (\"id\")";
        assert_eq!(keys.iter().filter(|k| k.as_str() == task_fk).count(), 1);
        assert!(keys.iter().any(|k| k.contains("\"project_members\"")
            && k.contains("(\"user_id\") REFERENCES \"users\" (\"user_no\")")));
        assert!(keys.iter().any(|k| k.contains("\"project_members\"")
            && k.contains("(\"project_id\") REFERENCES \"projects\" (\"id\")")));
        assert_eq!(keys.len(), 3);
    }

    #[test]
    fn test_generate_schema_order() {
        let model = model();
        let statements = DdlGenerator::new(&model).generate_schema().unwrap();

        assert_eq!(statements.len(), 3 + 1 + 3);
        assert!(statements[..3].iter().all(|s| s.starts_with("CREATE TABLE")));
        assert_eq!(
            statements[3],
            "CREATE TABLE IF NOT EXISTS \"project_members\" (\"project_id\" TEXT NOT NULL, \"user_id\" BIGINT NOT NULL, PRIMARY KEY (\"project_id\", \"user_id\"))"
        );
        assert!(statements[4..].iter().all(|s| s.starts_with("ALTER TABLE")));
    }

    // ==================== Column Formatting Tests ====================

    #[test]
    fn test_format_column_definition_enum() {
        let col = ColumnDefinition::new(
            "status",
            ColumnType::Enum {
                values: vec!["OPEN".to_string(), "DONE".to_string()],
            },
        )
        .not_null();
        assert_eq!(
            DdlGenerator::format_column_definition(&col),
            "\"status\" TEXT CHECK (\"status\" IN ('OPEN', 'DONE')) NOT NULL"
        );
    }
}
