//! Data model description
//!
//! Entity types are described explicitly: a table, a primary key, typed
//! attributes and named relations to other entity types. Relations refer to
//! their target by entity name, so cyclic and self-referencing graphs are
//! plain data. A `DataModel` is the registry every other component resolves
//! names against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::sql::sanitize::validate_identifier;
use crate::types::{ColumnDefinition, ColumnType};

fn default_primary_key() -> String {
    "id".to_string()
}

/// How many rows on each side of a relation may correspond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl Cardinality {
    /// Whether the owner side holds a collection
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Cardinality::OneToOne => "1:1",
            Cardinality::OneToMany => "1:N",
            Cardinality::ManyToOne => "N:1",
            Cardinality::ManyToMany => "N:N",
        };
        f.write_str(s)
    }
}

/// Association table of a many-to-many relation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinTable {
    pub table: String,
    /// Column referencing the owner's primary key
    pub source_column: String,
    /// Column referencing the target's primary key
    pub target_column: String,
}

impl JoinTable {
    pub fn new(
        table: impl Into<String>,
        source_column: impl Into<String>,
        target_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            source_column: source_column.into(),
            target_column: target_column.into(),
        }
    }
}

/// A named relation from one entity type to another.
///
/// Only `name` and `target` are required. Everything else is optional
/// metadata; missing pieces are inferred by the path inspector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    /// Target entity type name
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    /// Whether the owner side holds a collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<bool>,
    /// Name of the inverse relation on the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_populates: Option<String>,
    /// Foreign key column (on the owner for N:1, on the target for 1:N)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub through: Option<JoinTable>,
}

impl RelationDefinition {
    pub fn new(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            cardinality: None,
            collection: None,
            back_populates: None,
            foreign_key: None,
            through: None,
        }
    }

    pub fn one_to_many(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target).cardinality(Cardinality::OneToMany)
    }

    pub fn many_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target).cardinality(Cardinality::ManyToOne)
    }

    pub fn one_to_one(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, target).cardinality(Cardinality::OneToOne)
    }

    pub fn many_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        through: JoinTable,
    ) -> Self {
        let mut rel = Self::new(name, target).cardinality(Cardinality::ManyToMany);
        rel.through = Some(through);
        rel
    }

    pub fn cardinality(mut self, cardinality: Cardinality) -> Self {
        self.cardinality = Some(cardinality);
        self
    }

    pub fn collection(mut self, collection: bool) -> Self {
        self.collection = Some(collection);
        self
    }

    pub fn back_populates(mut self, name: impl Into<String>) -> Self {
        self.back_populates = Some(name.into());
        self
    }

    pub fn foreign_key(mut self, column: impl Into<String>) -> Self {
        self.foreign_key = Some(column.into());
        self
    }
}

/// An entity type: one table with typed attributes and relations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    #[serde(rename = "tableName")]
    pub table_name: String,
    #[serde(rename = "primaryKey", default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub attributes: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relations: Vec<RelationDefinition>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table_name: table_name.into(),
            primary_key: default_primary_key(),
            attributes: Vec::new(),
            relations: Vec::new(),
        }
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn attribute(mut self, column: ColumnDefinition) -> Self {
        self.attributes.push(column);
        self
    }

    pub fn relation(mut self, relation: RelationDefinition) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn get_attribute(&self, name: &str) -> Option<&ColumnDefinition> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.get_attribute(name).is_some()
    }

    /// Type of the primary key column
    pub fn primary_key_type(&self) -> ColumnType {
        self.get_attribute(&self.primary_key)
            .map(|a| a.column_type.clone())
            .unwrap_or(ColumnType::String)
    }

    /// Direct text attributes, in declaration order
    pub fn text_attributes(&self) -> impl Iterator<Item = &ColumnDefinition> {
        self.attributes
            .iter()
            .filter(|a| a.semantic_type() == crate::types::SemanticType::Text)
    }
}

/// Types that can describe their own entity type
pub trait DescribeEntity {
    fn describe() -> EntityType;
}

/// Registry of entity types, addressed by name
#[derive(Debug, Clone, Default)]
pub struct DataModel {
    entities: Vec<EntityType>,
    index: HashMap<String, usize>,
}

impl DataModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every entity, then check that all relation targets exist
    pub fn from_entities(entities: impl IntoIterator<Item = EntityType>) -> Result<Self> {
        let mut model = Self::new();
        for entity in entities {
            model.register(entity)?;
        }
        model.validate()?;
        Ok(model)
    }

    /// Register an entity type.
    ///
    /// Identifiers are validated, and the primary key is added as a
    /// non-null text attribute when it is not declared explicitly.
    pub fn register(&mut self, mut entity: EntityType) -> Result<()> {
        if entity.name.is_empty() {
            return Err(StoreError::validation("Entity name cannot be empty"));
        }
        if self.index.contains_key(&entity.name) {
            return Err(StoreError::validation(format!(
                "Entity '{}' is already registered",
                entity.name
            )));
        }
        validate_identifier(&entity.table_name, &[]).map_err(StoreError::Validation)?;
        validate_identifier(&entity.primary_key, &[]).map_err(StoreError::Validation)?;

        let mut seen = std::collections::HashSet::new();
        for attr in &entity.attributes {
            validate_identifier(&attr.name, &[]).map_err(StoreError::Validation)?;
            if !seen.insert(attr.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "Duplicate attribute '{}' on {}",
                    attr.name, entity.name
                )));
            }
        }
        for rel in &entity.relations {
            if rel.name.is_empty() || !seen.insert(rel.name.as_str()) {
                return Err(StoreError::validation(format!(
                    "Relation '{}' on {} clashes with another member",
                    rel.name, entity.name
                )));
            }
            if let Some(through) = &rel.through {
                validate_identifier(&through.table, &[]).map_err(StoreError::Validation)?;
            }
        }

        if !entity.has_attribute(&entity.primary_key) {
            let pk = ColumnDefinition::new(entity.primary_key.clone(), ColumnType::String).not_null();
            entity.attributes.insert(0, pk);
        }

        self.index.insert(entity.name.clone(), self.entities.len());
        self.entities.push(entity);
        Ok(())
    }

    /// Register a type that describes itself
    pub fn register_type<T: DescribeEntity>(&mut self) -> Result<()> {
        self.register(T::describe())
    }

    /// Check that relation targets exist and many-to-many relations name a join table
    pub fn validate(&self) -> Result<()> {
        for entity in &self.entities {
            for rel in &entity.relations {
                if !self.index.contains_key(&rel.target) {
                    return Err(StoreError::entity_not_found(format!(
                        "{}.{} targets unknown entity '{}'",
                        entity.name, rel.name, rel.target
                    )));
                }
                if rel.cardinality == Some(Cardinality::ManyToMany) && rel.through.is_none() {
                    return Err(StoreError::unsupported_relation(format!(
                        "{}.{} is many-to-many without a join table",
                        entity.name, rel.name
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&EntityType> {
        self.index.get(name).map(|&i| &self.entities[i])
    }

    /// Look up an entity, failing with `EntityNotFound`
    pub fn entity(&self, name: &str) -> Result<&EntityType> {
        self.get(name)
            .ok_or_else(|| StoreError::entity_not_found(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityType> {
        self.entities.iter()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// `TaskItem` -> `task_item`
pub(crate) fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> EntityType {
        EntityType::new("Project", "projects")
            .attribute(ColumnDefinition::new("name", ColumnType::String))
            .relation(RelationDefinition::one_to_many("tasks", "Task"))
    }

    fn task() -> EntityType {
        EntityType::new("Task", "tasks")
            .attribute(ColumnDefinition::new("title", ColumnType::String))
            .attribute(ColumnDefinition::new("project_id", ColumnType::String))
            .relation(RelationDefinition::many_to_one("project", "Project"))
    }

    #[test]
    fn test_register_adds_primary_key() {
        let model = DataModel::from_entities([project(), task()]).unwrap();
        let p = model.entity("Project").unwrap();
        assert_eq!(p.attributes[0].name, "id");
        assert!(!p.attributes[0].nullable);
        assert_eq!(p.primary_key_type(), ColumnType::String);
    }

    #[test]
    fn test_register_keeps_declared_primary_key() {
        let e = EntityType::new("Counter", "counters")
            .primary_key("idx")
            .attribute(ColumnDefinition::new("idx", ColumnType::Integer).not_null());
        let model = DataModel::from_entities([e]).unwrap();
        let c = model.entity("Counter").unwrap();
        assert_eq!(c.attributes.len(), 1);
        assert_eq!(c.primary_key_type(), ColumnType::Integer);
    }

    #[test]
    fn test_register_rejects_bad_identifiers() {
        let mut model = DataModel::new();
        let err = model.register(EntityType::new("Bad", "Bad Table")).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = model
            .register(
                EntityType::new("Order", "orders")
                    .attribute(ColumnDefinition::new("select", ColumnType::String)),
            )
            .unwrap_err();
        assert!(err.to_string().contains("reserved"));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut model = DataModel::new();
        model.register(project()).unwrap();
        assert!(model.register(project()).is_err());

        let clash = EntityType::new("Clash", "clash")
            .attribute(ColumnDefinition::new("owner", ColumnType::String))
            .relation(RelationDefinition::many_to_one("owner", "Clash"));
        assert!(DataModel::new().register(clash).is_err());
    }

    #[test]
    fn test_validate_unknown_target() {
        let err = DataModel::from_entities([project()]).unwrap_err();
        assert!(matches!(err, StoreError::EntityNotFound(_)));
    }

    #[test]
    fn test_validate_many_to_many_requires_join_table() {
        let tag = EntityType::new("Tag", "tags")
            .relation(RelationDefinition::new("tasks", "Tag").cardinality(Cardinality::ManyToMany));
        let err = DataModel::from_entities([tag]).unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedRelation(_)));
    }

    #[test]
    fn test_describe_entity_registration() {
        struct Label;
        impl DescribeEntity for Label {
            fn describe() -> EntityType {
                EntityType::new("Label", "labels")
                    .attribute(ColumnDefinition::new("color", ColumnType::String))
            }
        }

        let mut model = DataModel::new();
        model.register_type::<Label>().unwrap();
        assert!(model.get("Label").unwrap().has_attribute("color"));
        assert_eq!(model.len(), 1);
    }

    #[test]
    fn test_entity_type_deserializes() {
        let json = serde_json::json!({
            "name": "Task",
            "tableName": "tasks",
            "attributes": [{"name": "title", "type": "string"}],
            "relations": [{"name": "comments", "target": "Comment", "cardinality": "one_to_many"}]
        });
        let e: EntityType = serde_json::from_value(json).unwrap();
        assert_eq!(e.primary_key, "id");
        assert_eq!(
            e.get_relation("comments").unwrap().cardinality,
            Some(Cardinality::OneToMany)
        );
    }

    #[test]
    fn test_snake_case() {
        assert_eq!(snake_case("Task"), "task");
        assert_eq!(snake_case("TaskItem"), "task_item");
        assert_eq!(snake_case("user"), "user");
    }

    #[test]
    fn test_cardinality_display() {
        assert_eq!(Cardinality::OneToMany.to_string(), "1:N");
        assert!(Cardinality::ManyToMany.is_to_many());
        assert!(!Cardinality::ManyToOne.is_to_many());
    }
}
