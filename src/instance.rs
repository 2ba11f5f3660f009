//! In-memory entity instances
//!
//! An `EntityInstance` is a live record of one entity type: its attribute
//! values plus the relation collections loaded with it. The graph
//! synchronizer mutates instances in place; persisting them is up to the
//! caller's session.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};
use crate::query::inspector::PathInspector;
use crate::schema::DataModel;

/// Lifecycle of an instance relative to the database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Created in memory, not yet inserted
    New,
    /// Loaded from (or already written to) the database
    Persisted,
}

/// A loaded relation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Related {
    Many(Vec<EntityInstance>),
    One(Option<Box<EntityInstance>>),
}

impl Related {
    pub fn len(&self) -> usize {
        match self {
            Related::Many(items) => items.len(),
            Related::One(item) => usize::from(item.is_some()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A record of one entity type with its loaded relations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInstance {
    entity: String,
    fields: BTreeMap<String, Value>,
    relations: BTreeMap<String, Related>,
    state: InstanceState,
}

impl EntityInstance {
    /// Create an empty, unsaved instance
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            fields: BTreeMap::new(),
            relations: BTreeMap::new(),
            state: InstanceState::New,
        }
    }

    /// Create an instance for a row that already exists
    pub fn persisted(entity: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            entity: entity.into(),
            fields,
            relations: BTreeMap::new(),
            state: InstanceState::Persisted,
        }
    }

    /// Build a persisted instance graph from a JSON object.
    ///
    /// Keys naming a relation of `entity` are loaded recursively: arrays
    /// become `Related::Many`, objects and null become `Related::One`. Every
    /// other key is an attribute value.
    pub fn from_value(model: &DataModel, entity: &str, value: &Value) -> Result<Self> {
        let entity_type = model.entity(entity)?;
        let Value::Object(map) = value else {
            return Err(StoreError::conversion(format!(
                "{} instance must be a JSON object, got {}",
                entity, value
            )));
        };
        let inspector = PathInspector::new(model);

        let mut instance = Self::persisted(entity, BTreeMap::new());
        for (key, item) in map {
            let Some(relation) = entity_type.get_relation(key) else {
                instance.fields.insert(key.clone(), item.clone());
                continue;
            };
            let related = match (item, inspector.cardinality(entity_type, relation)?) {
                (Value::Array(items), _) => Related::Many(
                    items
                        .iter()
                        .map(|v| Self::from_value(model, &relation.target, v))
                        .collect::<Result<_>>()?,
                ),
                (Value::Null, c) if c.is_to_many() => Related::Many(Vec::new()),
                (Value::Null, _) => Related::One(None),
                (Value::Object(_), _) => Related::One(Some(Box::new(Self::from_value(
                    model,
                    &relation.target,
                    item,
                )?))),
                (other, _) => {
                    return Err(StoreError::conversion(format!(
                        "relation '{}' of {} cannot hold {}",
                        key, entity, other
                    )));
                }
            };
            instance.relations.insert(key.clone(), related);
        }
        Ok(instance)
    }

    /// Add an attribute value (builder form)
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Add a loaded relation (builder form)
    pub fn with_relation(mut self, name: impl Into<String>, related: Related) -> Self {
        self.relations.insert(name.into(), related);
        self
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    pub fn is_new(&self) -> bool {
        self.state == InstanceState::New
    }

    pub fn mark_persisted(&mut self) {
        self.state = InstanceState::Persisted;
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Whether `field` holds a non-null value
    pub fn has_value(&self, field: &str) -> bool {
        self.fields.get(field).is_some_and(|v| !v.is_null())
    }

    /// Whether the boolean `field` is set to true
    pub fn is_flagged(&self, field: &str) -> bool {
        self.fields.get(field) == Some(&Value::Bool(true))
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Set an attribute value, returning the previous one
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relation_mut(&mut self, name: &str) -> Option<&mut Related> {
        self.relations.get_mut(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    /// Children loaded for a to-many relation; empty when not loaded
    pub fn children(&self, name: &str) -> &[EntityInstance] {
        match self.relations.get(name) {
            Some(Related::Many(items)) => items,
            _ => &[],
        }
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Remove a loaded relation, leaving it unloaded
    pub fn take_relation(&mut self, name: &str) -> Option<Related> {
        self.relations.remove(name)
    }

    /// Attributes and loaded relations as one JSON object
    pub fn to_value(&self) -> Value {
        let mut map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (name, related) in &self.relations {
            let value = match related {
                Related::Many(items) => Value::Array(items.iter().map(Self::to_value).collect()),
                Related::One(Some(item)) => item.to_value(),
                Related::One(None) => Value::Null,
            };
            map.insert(name.clone(), value);
        }
        Value::Object(map)
    }
}
