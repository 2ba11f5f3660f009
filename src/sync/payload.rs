//! Payload schemas
//!
//! A `PayloadSchema` is the canonical shape of a create/update payload:
//! scalar fields typed by their column definition and nested list fields
//! whose items follow another payload schema. The reconciler uses it to
//! recover a relation's base shape and to turn both stored children and
//! incoming items into comparable records.

use std::collections::BTreeSet;

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{Result, StoreError};
use crate::instance::EntityInstance;
use crate::query::inspector::{Link, PathInspector};
use crate::schema::{Cardinality, DataModel, EntityType};
use crate::sync::record::Record;
use crate::types::ColumnDefinition;

/// One field of a payload schema
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadField {
    Scalar(ColumnDefinition),
    /// A list of nested objects
    List(PayloadSchema),
    /// A single nested object or null
    One(PayloadSchema),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadSchema {
    name: String,
    fields: Vec<(String, PayloadField)>,
}

impl PayloadSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    pub fn scalar(mut self, column: ColumnDefinition) -> Self {
        self.fields
            .push((column.name.clone(), PayloadField::Scalar(column)));
        self
    }

    pub fn list(mut self, name: impl Into<String>, items: PayloadSchema) -> Self {
        self.fields.push((name.into(), PayloadField::List(items)));
        self
    }

    pub fn one(mut self, name: impl Into<String>, item: PayloadSchema) -> Self {
        self.fields.push((name.into(), PayloadField::One(item)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field(&self, name: &str) -> Option<&PayloadField> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, f)| f)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &PayloadField)> {
        self.fields.iter().map(|(n, f)| (n.as_str(), f))
    }

    /// Item schema of the list field `relation`
    pub fn base_schema(&self, relation: &str) -> Result<&PayloadSchema> {
        match self.field(relation) {
            Some(PayloadField::List(items)) => Ok(items),
            Some(_) => Err(StoreError::unknown_path(
                relation,
                format!("{} declares it as a non-list field", self.name),
            )),
            None => Err(StoreError::unknown_path(
                relation,
                format!("{} has no such field", self.name),
            )),
        }
    }

    /// Convert a JSON object to a record of this schema.
    ///
    /// Unknown keys are dropped and absent fields become null. Scalars are
    /// checked against their column definition; nested fields are converted
    /// recursively.
    pub fn conform(&self, value: &Value) -> Result<Record> {
        let Value::Object(map) = value else {
            return Err(StoreError::conversion(format!(
                "{} expects an object, got {}",
                self.name, value
            )));
        };

        let mut record = Record::new(self.name.as_str());
        for (name, field) in &self.fields {
            let value = map.get(name).unwrap_or(&Value::Null);
            let converted = match field {
                PayloadField::Scalar(column) => {
                    column.validate(value).map_err(|e| {
                        StoreError::conversion(format!("{}: {}", self.name, e))
                    })?;
                    value.clone()
                }
                PayloadField::List(items) => match value {
                    Value::Null => Value::Array(Vec::new()),
                    Value::Array(values) => Value::Array(
                        values
                            .iter()
                            .map(|v| items.conform(v).map(record_value))
                            .collect::<Result<_>>()?,
                    ),
                    other => {
                        return Err(StoreError::conversion(format!(
                            "{}.{} expects a list, got {}",
                            self.name, name, other
                        )));
                    }
                },
                PayloadField::One(item) => match value {
                    Value::Null => Value::Null,
                    other => record_value(item.conform(other)?),
                },
            };
            record = record.field(name.as_str(), converted);
        }
        Ok(record)
    }

    pub fn conform_instance(&self, instance: &EntityInstance) -> Result<Record> {
        self.conform(&instance.to_value())
    }

    /// Derive the payload schema of `entity` from the data model.
    ///
    /// Audit and soft-delete columns are left out, the primary key is
    /// optional, and nested lists omit the foreign key pointing back at
    /// their owner. Only one-to-many and one-to-one relations are nested.
    /// Nesting ends at `config.max_depth`, the same limit the synchronizer
    /// walks to, so a self-referential relation repeats down to that level.
    pub fn from_entity(model: &DataModel, entity: &str, config: &SyncConfig) -> Result<Self> {
        let root = model.entity(entity)?;
        derive(model, root, &BTreeSet::new(), config, 0)
    }
}

fn record_value(record: Record) -> Value {
    Value::Object(record.into_fields().into_iter().collect::<Map<_, _>>())
}

fn derive(
    model: &DataModel,
    entity: &EntityType,
    skip: &BTreeSet<String>,
    config: &SyncConfig,
    depth: usize,
) -> Result<PayloadSchema> {
    let inspector = PathInspector::new(model);
    let mut schema = PayloadSchema::new(entity.name.as_str());

    for attribute in &entity.attributes {
        let name = attribute.name.as_str();
        if skip.contains(name)
            || config.audit_columns.contains(name)
            || name == config.default_deleted_column
        {
            continue;
        }
        let mut column = attribute.clone();
        if name == entity.primary_key {
            column.nullable = true;
        }
        schema = schema.scalar(column);
    }

    for relation in &entity.relations {
        let cardinality = inspector.cardinality(entity, relation)?;
        if !matches!(cardinality, Cardinality::OneToMany | Cardinality::OneToOne) {
            continue;
        }
        if depth >= config.max_depth {
            debug!(
                entity = %entity.name,
                relation = %relation.name,
                depth,
                "Not nesting relation into payload schema"
            );
            continue;
        }
        let target = model.entity(&relation.target)?;

        let mut child_skip = BTreeSet::new();
        if let Link::Direct {
            owner_column,
            target_column,
        } = inspector.link(entity, relation)?
        {
            if owner_column == entity.primary_key {
                child_skip.insert(target_column);
            }
        }
        if let Some(column) = config.relation(&relation.name).deleted_column {
            child_skip.insert(column);
        }

        let nested = derive(model, target, &child_skip, config, depth + 1)?;
        schema = match cardinality {
            Cardinality::OneToMany => schema.list(relation.name.as_str(), nested),
            _ => schema.one(relation.name.as_str(), nested),
        };
    }

    Ok(schema)
}
