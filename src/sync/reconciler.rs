//! To-many relation reconciliation
//!
//! `RelationshipReconciler::reconcile` replaces a parent's loaded children
//! for one relation with the state described by a new payload list. Each
//! existing child ends up kept, mutated in place, or deleted (soft or hard);
//! payload items with no existing counterpart are created.

use std::fmt;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::{RelationConfig, SyncConfig};
use crate::error::{Result, StoreError};
use crate::instance::{EntityInstance, Related};
use crate::query::inspector::{Link, PathInspector};
use crate::schema::{DataModel, EntityType};
use crate::sync::comparator::{CompareOptions, Comparator};
use crate::sync::metadata::MetadataStamper;
use crate::sync::payload::{PayloadField, PayloadSchema};
use crate::sync::record::Record;
use crate::sync::synchronizer::SyncContext;

/// Creates and updates the nested parts of a reconciled relation.
///
/// The graph synchronizer implements this so added children go through the
/// same create path as top-level instances.
pub trait ChildFactory {
    /// Create a child of `entity` from payload `data`
    fn create_child(
        &self,
        entity: &EntityType,
        data: Map<String, Value>,
        ctx: &mut SyncContext,
    ) -> Result<EntityInstance>;

    /// Reconcile the to-many `relation` of an existing child
    fn update_nested(
        &self,
        child: &mut EntityInstance,
        relation: &str,
        items: &[Value],
        schema: &PayloadSchema,
        ctx: &mut SyncContext,
    ) -> Result<()>;
}

/// Counts of what one reconciliation did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub entity: String,
    pub relation: String,
    pub already_deleted: usize,
    pub kept: usize,
    pub mutated: usize,
    pub created: usize,
    pub soft_deleted: usize,
    pub hard_deleted: usize,
    /// Existing children that could not be converted and were left untouched
    pub unconverted: usize,
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}: kept={} mutated={} created={} soft_deleted={} hard_deleted={}",
            self.entity,
            self.relation,
            self.kept,
            self.mutated,
            self.created,
            self.soft_deleted,
            self.hard_deleted
        )
    }
}

pub struct RelationshipReconciler<'a> {
    model: &'a DataModel,
    config: &'a SyncConfig,
    stamper: MetadataStamper<'a>,
}

impl<'a> RelationshipReconciler<'a> {
    pub fn new(model: &'a DataModel, config: &'a SyncConfig) -> Self {
        Self {
            model,
            config,
            stamper: MetadataStamper::from_config(config),
        }
    }

    /// Reconcile `parent.relation` against `items`.
    ///
    /// `schema` is the payload schema of the parent; the relation's item
    /// shape is recovered from its list field of the same name. The
    /// relation must be loaded on `parent`, even when it has no children.
    pub fn reconcile<F: ChildFactory>(
        &self,
        parent: &mut EntityInstance,
        relation: &str,
        items: &[Value],
        schema: &PayloadSchema,
        factory: &F,
        ctx: &mut SyncContext,
    ) -> Result<ReconcileReport> {
        let owner = self.model.entity(parent.entity())?;
        let rel = owner.get_relation(relation).ok_or_else(|| {
            StoreError::unknown_path(relation, format!("{} has no such relation", owner.name))
        })?;
        let target = self.model.entity(&rel.target)?;
        let rel_config = self.config.relation(relation);
        let base = schema.base_schema(relation)?;

        let (parent_key, foreign_key) = match PathInspector::new(self.model).link(owner, rel)? {
            Link::Direct {
                owner_column,
                target_column,
            } => (owner_column, target_column),
            Link::Through { .. } => {
                return Err(StoreError::unsupported_relation(format!(
                    "{}.{} is many-to-many",
                    owner.name, relation
                )));
            }
        };

        let mut report = ReconcileReport {
            entity: owner.name.clone(),
            relation: relation.to_string(),
            ..Default::default()
        };

        let existing = match parent.take_relation(relation) {
            Some(Related::Many(children)) => children,
            Some(Related::One(_)) => Vec::new(),
            None => {
                return Err(StoreError::validation(format!(
                    "{}.{} is not loaded; load it before updating it",
                    owner.name, relation
                )));
            }
        };
        let (mut finished, active): (Vec<EntityInstance>, Vec<EntityInstance>) =
            match &rel_config.deleted_column {
                Some(column) => existing.into_iter().partition(|c| c.is_flagged(column)),
                None => (Vec::new(), existing),
            };
        report.already_deleted = finished.len();
        debug!(
            relation = %relation,
            active = active.len(),
            already_deleted = finished.len(),
            "Reconciling relation"
        );

        let mut old_records = Vec::with_capacity(active.len());
        let mut candidates: Vec<(Record, EntityInstance)> = Vec::with_capacity(active.len());
        let mut untouched = Vec::new();
        for child in active {
            match base.conform_instance(&child) {
                Ok(record) => {
                    old_records.push(record.clone());
                    candidates.push((record, child));
                }
                Err(e) => {
                    warn!(relation = %relation, error = %e, "Existing child does not fit its payload shape, leaving it untouched");
                    untouched.push(child);
                }
            }
        }
        report.unconverted = untouched.len();

        let new_records = items
            .iter()
            .map(|item| base.conform(item))
            .collect::<Result<Vec<_>>>()?;

        let comparator = Comparator::new(old_records, new_records, CompareOptions::from(&rel_config))?;
        debug!("{}", comparator.pretty(&format!("{}.{}", owner.name, relation)));

        let mut slots: Vec<Option<(Record, EntityInstance)>> =
            candidates.into_iter().map(Some).collect();

        for record in comparator.unchanged() {
            if let Some(child) = take_match(&mut slots, record, &rel_config) {
                finished.push(child);
                report.kept += 1;
            }
        }

        for item in comparator.modified() {
            let Some(mut child) = take_match(&mut slots, &item.old, &rel_config) else {
                warn!(relation = %relation, key = ?item.key, "No existing child for modified item");
                continue;
            };
            for (field, change) in &item.changed_fields {
                if rel_config.exclude_fields.contains(field) {
                    continue;
                }
                match base.field(field) {
                    Some(PayloadField::List(_)) => {
                        let nested = change.new.as_array().map(Vec::as_slice).unwrap_or(&[]);
                        factory.update_nested(&mut child, field, nested, base, ctx)?;
                    }
                    _ if target.has_attribute(field) => {
                        child.set(field.as_str(), change.new.clone());
                    }
                    _ => debug!(field = %field, "Skipping change to a non-attribute field"),
                }
            }
            self.stamper.update(&mut child, target);
            finished.push(child);
            report.mutated += 1;
        }

        for record in comparator.added() {
            let mut data: Map<String, Value> = record.fields().clone().into_iter().collect();
            if let Some(key) = parent.get(&parent_key).filter(|v| !v.is_null()) {
                data.insert(foreign_key.clone(), key.clone());
            }
            finished.push(factory.create_child(target, data, ctx)?);
            report.created += 1;
        }

        for record in comparator.removed() {
            let Some(mut child) = take_match(&mut slots, record, &rel_config) else {
                warn!(relation = %relation, record = %record, "No existing child for removed item");
                continue;
            };
            match &rel_config.deleted_column {
                Some(column) => {
                    self.stamper.soft_delete(&mut child, target, column)?;
                    finished.push(child);
                    report.soft_deleted += 1;
                }
                None => {
                    ctx.hard_delete(child);
                    report.hard_deleted += 1;
                }
            }
        }

        finished.extend(untouched);
        parent.set_relation(relation, Related::Many(finished));
        debug!("{}", report);
        Ok(report)
    }
}

/// Take the first remaining child whose record matches `record` on the key
/// fields, or on every field of `record` when no key is configured
fn take_match(
    slots: &mut [Option<(Record, EntityInstance)>],
    record: &Record,
    config: &RelationConfig,
) -> Option<EntityInstance> {
    let matches = |candidate: &Record| {
        if config.key_fields.is_empty() {
            record.fields().iter().all(|(f, v)| candidate.get(f) == Some(v))
        } else {
            config
                .key_fields
                .iter()
                .all(|f| candidate.get(f) == record.get(f))
        }
    };
    slots
        .iter_mut()
        .find(|slot| slot.as_ref().is_some_and(|(r, _)| matches(r)))
        .and_then(Option::take)
        .map(|(_, child)| child)
}
