//! Graph synchronization
//!
//! `GraphSynchronizer` walks an entity's relation graph for the four write
//! operations. Many-to-one relations are foreign keys only and always
//! skipped, one-to-many relations are created or reconciled, one-to-one
//! relations are not implemented and many-to-many relations are rejected.
//! Recursion stops at the configured depth with a warning.
//!
//! Nothing here touches the database: the caller persists the returned
//! instance graph and deletes `SyncOutcome::hard_deleted` within one
//! transaction.

use serde_json::{Map, Value};
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Result, StoreError};
use crate::instance::{EntityInstance, Related};
use crate::query::inspector::{Link, PathInspector};
use crate::schema::{Cardinality, DataModel, EntityType, RelationDefinition};
use crate::sync::metadata::MetadataStamper;
use crate::sync::payload::PayloadSchema;
use crate::sync::reconciler::{ChildFactory, ReconcileReport, RelationshipReconciler};
use crate::types::ColumnType;

/// How delete and restore treat rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Flip the soft-delete column
    Soft,
    /// Remove rows; only valid for delete
    Hard,
}

/// Result of a synchronizer call
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOutcome {
    /// The created or mutated top-level instance
    pub instance: EntityInstance,
    /// Instances the caller must delete, children before parents
    pub hard_deleted: Vec<EntityInstance>,
    /// One report per reconciled relation, innermost first
    pub reports: Vec<ReconcileReport>,
}

/// Per-call recursion state
#[derive(Debug, Default)]
pub struct SyncContext {
    depth: usize,
    walk: Vec<String>,
    hard_deleted: Vec<EntityInstance>,
    reports: Vec<ReconcileReport>,
}

impl SyncContext {
    fn new(root: &str) -> Self {
        Self {
            walk: vec![root.to_string()],
            ..Default::default()
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Queue an instance for hard deletion
    pub fn hard_delete(&mut self, instance: EntityInstance) {
        self.hard_deleted.push(instance);
    }

    fn finish(self, instance: EntityInstance) -> SyncOutcome {
        SyncOutcome {
            instance,
            hard_deleted: self.hard_deleted,
            reports: self.reports,
        }
    }
}

pub struct GraphSynchronizer<'a> {
    model: &'a DataModel,
    config: SyncConfig,
}

impl<'a> GraphSynchronizer<'a> {
    pub fn new(model: &'a DataModel, config: SyncConfig) -> Self {
        Self { model, config }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    fn stamper(&self) -> MetadataStamper<'_> {
        MetadataStamper::from_config(&self.config)
    }

    fn inspector(&self) -> PathInspector<'a> {
        PathInspector::new(self.model)
    }

    /// Run `f` one level deeper, or skip it with a warning at the depth limit
    fn descend<T>(
        &self,
        ctx: &mut SyncContext,
        target: &str,
        f: impl FnOnce(&mut SyncContext) -> Result<T>,
    ) -> Result<Option<T>> {
        if ctx.depth >= self.config.max_depth {
            warn!(
                depth = ctx.depth,
                entity = %target,
                "Maximum nesting depth reached, skipping branch"
            );
            return Ok(None);
        }
        if ctx.walk.iter().any(|e| e == target) {
            trace!(entity = %target, walk = ?ctx.walk, "Entity type revisited");
        }
        ctx.depth += 1;
        ctx.walk.push(target.to_string());
        let result = f(ctx);
        ctx.walk.pop();
        ctx.depth -= 1;
        result.map(Some)
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Build a new instance graph of `entity` from `data`.
    ///
    /// Nested one-to-many lists become new children carrying the parent's
    /// key; a missing text primary key is generated so children can refer
    /// to it before anything is persisted.
    pub fn create(&self, entity: &str, data: &Value) -> Result<SyncOutcome> {
        let entity_type = self.model.entity(entity)?;
        let map = as_object(entity, data)?;
        let mut ctx = SyncContext::new(entity);
        let instance = self.create_node(entity_type, map.clone(), &mut ctx)?;
        Ok(ctx.finish(instance))
    }

    fn create_node(
        &self,
        entity: &EntityType,
        data: Map<String, Value>,
        ctx: &mut SyncContext,
    ) -> Result<EntityInstance> {
        let (fields, nested) = self.split(entity, data)?;
        let mut instance = EntityInstance::new(entity.name.as_str());
        for (name, value) in fields {
            instance.set(name, value);
        }
        if !instance.has_value(&entity.primary_key) && entity.primary_key_type() == ColumnType::String {
            instance.set(entity.primary_key.as_str(), Uuid::new_v4().to_string());
        }
        self.stamper().creation(&mut instance, entity);

        for (rel, value) in nested {
            if !self.owns(entity, rel)? {
                continue;
            }
            let target = self.model.entity(&rel.target)?;
            let items = object_list(entity, rel, &value)?;
            let foreign_key = self.child_foreign_key(entity, rel)?;
            let parent_key = instance.get(&entity.primary_key).cloned();

            let children = self.descend(ctx, &target.name, |ctx| {
                items
                    .into_iter()
                    .map(|mut item| {
                        if let Some(key) = &parent_key {
                            item.insert(foreign_key.clone(), key.clone());
                        }
                        self.create_node(target, item, ctx)
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            if let Some(children) = children {
                instance.set_relation(rel.name.as_str(), Related::Many(children));
            }
        }
        Ok(instance)
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Apply `data` to `instance`, reconciling nested one-to-many lists.
    ///
    /// `schema` is the payload schema of the instance's entity; it provides
    /// the item shape of every nested list.
    pub fn update(
        &self,
        mut instance: EntityInstance,
        data: &Value,
        schema: &PayloadSchema,
    ) -> Result<SyncOutcome> {
        let entity = self.model.entity(instance.entity())?;
        let map = as_object(&entity.name, data)?;
        let mut ctx = SyncContext::new(&entity.name);
        self.update_node(&mut instance, entity, map.clone(), schema, &mut ctx)?;
        self.stamper().update(&mut instance, entity);
        Ok(ctx.finish(instance))
    }

    fn update_node(
        &self,
        instance: &mut EntityInstance,
        entity: &EntityType,
        data: Map<String, Value>,
        schema: &PayloadSchema,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        let (fields, nested) = self.split(entity, data)?;
        for (name, value) in fields {
            instance.set(name, value);
        }
        for (rel, value) in nested {
            if !self.owns(entity, rel)? {
                continue;
            }
            let items: Vec<Value> = object_list(entity, rel, &value)?
                .into_iter()
                .map(Value::Object)
                .collect();
            self.reconcile_relation(instance, rel, &items, schema, ctx)?;
        }
        Ok(())
    }

    fn reconcile_relation(
        &self,
        instance: &mut EntityInstance,
        rel: &RelationDefinition,
        items: &[Value],
        schema: &PayloadSchema,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        let reconciler = RelationshipReconciler::new(self.model, &self.config);
        let report = self.descend(ctx, &rel.target, |ctx| {
            reconciler.reconcile(instance, &rel.name, items, schema, self, ctx)
        })?;
        if let Some(report) = report {
            ctx.reports.push(report);
        }
        Ok(())
    }

    // ========================================================================
    // Delete / restore
    // ========================================================================

    /// Delete `instance` and its loaded one-to-many children.
    ///
    /// Soft mode sets the soft-delete column on every touched instance,
    /// using a relation's own column when configured; an instance without
    /// that column is a validation error. Hard mode returns the whole
    /// loaded subtree in `hard_deleted`, children first.
    pub fn delete(&self, mut instance: EntityInstance, mode: DeleteMode) -> Result<SyncOutcome> {
        let entity = self.model.entity(instance.entity())?;
        let mut ctx = SyncContext::new(&entity.name);
        debug!(entity = %entity.name, ?mode, "Deleting instance graph");
        match mode {
            DeleteMode::Soft => {
                let column = self.config.default_deleted_column.clone();
                self.set_deleted(&mut instance, entity, &column, true, &mut ctx)?;
            }
            DeleteMode::Hard => {
                self.collect_subtree(&instance, entity, &mut ctx)?;
            }
        }
        Ok(ctx.finish(instance))
    }

    /// Undo a soft delete of `instance` and its loaded one-to-many children
    pub fn restore(&self, mut instance: EntityInstance, mode: DeleteMode) -> Result<SyncOutcome> {
        if mode == DeleteMode::Hard {
            return Err(StoreError::validation(
                "restore is only possible for soft-deleted instances",
            ));
        }
        let entity = self.model.entity(instance.entity())?;
        let mut ctx = SyncContext::new(&entity.name);
        let column = self.config.default_deleted_column.clone();
        self.set_deleted(&mut instance, entity, &column, false, &mut ctx)?;
        debug!(entity = %entity.name, "Restored instance graph");
        Ok(ctx.finish(instance))
    }

    fn set_deleted(
        &self,
        instance: &mut EntityInstance,
        entity: &EntityType,
        column: &str,
        deleted: bool,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        let stamper = self.stamper();
        if deleted {
            stamper.soft_delete(instance, entity, column)?;
        } else {
            stamper.restore(instance, entity, column)?;
        }

        for rel in &entity.relations {
            if !self.is_loaded(instance, rel) || !self.owns(entity, rel)? {
                continue;
            }
            let target = self.model.entity(&rel.target)?;
            let child_column = self
                .config
                .relation(&rel.name)
                .deleted_column
                .unwrap_or_else(|| column.to_string());
            let Some(Related::Many(children)) = instance.relation_mut(&rel.name) else {
                continue;
            };
            self.descend(ctx, &target.name, |ctx| {
                children
                    .iter_mut()
                    .try_for_each(|child| self.set_deleted(child, target, &child_column, deleted, ctx))
            })?;
        }
        Ok(())
    }

    fn collect_subtree(
        &self,
        instance: &EntityInstance,
        entity: &EntityType,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        for rel in &entity.relations {
            if !self.is_loaded(instance, rel) || !self.owns(entity, rel)? {
                continue;
            }
            let target = self.model.entity(&rel.target)?;
            self.descend(ctx, &target.name, |ctx| {
                instance
                    .children(&rel.name)
                    .iter()
                    .try_for_each(|child| self.collect_subtree(child, target, ctx))
            })?;
        }
        ctx.hard_delete(instance.clone());
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Whether the synchronizer walks into `rel`: true for one-to-many,
    /// false for many-to-one, an error for one-to-one and many-to-many
    fn owns(&self, entity: &EntityType, rel: &RelationDefinition) -> Result<bool> {
        match self.inspector().cardinality(entity, rel)? {
            Cardinality::ManyToOne => {
                debug!(entity = %entity.name, relation = %rel.name, "Skipping many-to-one relation");
                Ok(false)
            }
            Cardinality::OneToMany => Ok(true),
            Cardinality::OneToOne => Err(StoreError::not_implemented(format!(
                "one-to-one synchronization of {}.{}",
                entity.name, rel.name
            ))),
            Cardinality::ManyToMany => Err(StoreError::unsupported_relation(format!(
                "{}.{} is many-to-many and cannot be synchronized",
                entity.name, rel.name
            ))),
        }
    }

    fn is_loaded(&self, instance: &EntityInstance, rel: &RelationDefinition) -> bool {
        !matches!(instance.relation(&rel.name), None | Some(Related::One(None)))
    }

    fn child_foreign_key(&self, entity: &EntityType, rel: &RelationDefinition) -> Result<String> {
        match self.inspector().link(entity, rel)? {
            Link::Direct { target_column, .. } => Ok(target_column),
            Link::Through { .. } => Err(StoreError::unsupported_relation(format!(
                "{}.{} is many-to-many",
                entity.name, rel.name
            ))),
        }
    }

    /// Split a payload into attribute values and relation values
    fn split<'e>(
        &self,
        entity: &'e EntityType,
        data: Map<String, Value>,
    ) -> Result<(Vec<(String, Value)>, Vec<(&'e RelationDefinition, Value)>)> {
        let mut fields = Vec::new();
        let mut nested = Vec::new();
        for (key, value) in data {
            if let Some(rel) = entity.get_relation(&key) {
                nested.push((rel, value));
            } else if let Some(column) = entity.get_attribute(&key) {
                column
                    .column_type
                    .validate_value(&value)
                    .map_err(|e| StoreError::validation(format!("{}.{}: {}", entity.name, key, e)))?;
                fields.push((key, value));
            } else {
                return Err(StoreError::validation(format!(
                    "{} has no attribute or relation '{}'",
                    entity.name, key
                )));
            }
        }
        Ok((fields, nested))
    }
}

impl ChildFactory for GraphSynchronizer<'_> {
    fn create_child(
        &self,
        entity: &EntityType,
        data: Map<String, Value>,
        ctx: &mut SyncContext,
    ) -> Result<EntityInstance> {
        self.create_node(entity, data, ctx)
    }

    fn update_nested(
        &self,
        child: &mut EntityInstance,
        relation: &str,
        items: &[Value],
        schema: &PayloadSchema,
        ctx: &mut SyncContext,
    ) -> Result<()> {
        let entity = self.model.entity(child.entity())?;
        let rel = entity.get_relation(relation).ok_or_else(|| {
            StoreError::unknown_path(relation, format!("{} has no such relation", entity.name))
        })?;
        if !self.owns(entity, rel)? {
            return Ok(());
        }
        self.reconcile_relation(child, rel, items, schema, ctx)
    }
}

fn as_object<'v>(entity: &str, data: &'v Value) -> Result<&'v Map<String, Value>> {
    data.as_object().ok_or_else(|| {
        StoreError::conversion(format!("{} payload must be an object, got {}", entity, data))
    })
}

/// A to-many relation value: a list of objects, or null for none
fn object_list(
    entity: &EntityType,
    rel: &RelationDefinition,
    value: &Value,
) -> Result<Vec<Map<String, Value>>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(map) => Ok(map.clone()),
                other => Err(StoreError::conversion(format!(
                    "{}.{} items must be objects, got {}",
                    entity.name, rel.name, other
                ))),
            })
            .collect(),
        other => Err(StoreError::conversion(format!(
            "{}.{} expects a list, got {}",
            entity.name, rel.name, other
        ))),
    }
}
