//! Path resolution to aliased columns and joins
//!
//! A `PathResolver` belongs to one compilation. Each distinct relation prefix
//! of a resolved path gets one aliased join, cached by its join path key, so
//! `project.name` and `project.owner_id` share the `project` join.

use std::collections::HashMap;

use tracing::trace;

use crate::error::{Result, StoreError};
use crate::query::inspector::{Link, PathInfo, PathInspector, PathKind};
use crate::schema::{Cardinality, DataModel, EntityType, RelationDefinition};
use crate::sql::condition::{ColumnRef, Join, TableRef};
use crate::types::ColumnDefinition;

/// Generates aliases `{prefix}0`, `{prefix}1`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasSeq {
    prefix: &'static str,
    next: usize,
}

impl AliasSeq {
    pub fn new(prefix: &'static str) -> Self {
        Self { prefix, next: 0 }
    }

    pub fn next_alias(&mut self) -> String {
        let alias = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        alias
    }
}

/// The joins needed to reach one relation prefix
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    /// Dotted relation prefix, e.g. `project.owner`
    pub key: String,
    /// Alias of the prefix's target table
    pub alias: String,
    /// One join, or two for a many-to-many association table
    pub joins: Vec<Join>,
}

/// A relation reached at the end of a path
#[derive(Debug, Clone, PartialEq)]
pub struct RelationRef {
    /// Alias of the table declaring the relation
    pub owner_alias: String,
    pub owner: String,
    pub relation: RelationDefinition,
    pub cardinality: Cardinality,
    pub link: Link,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedTarget {
    Column {
        column: ColumnRef,
        definition: ColumnDefinition,
    },
    Relation(RelationRef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPath {
    pub info: PathInfo,
    pub target: ResolvedTarget,
    /// Joins in dependency order, including ones reused from the cache
    pub joins: Vec<JoinSpec>,
}

/// Resolves paths relative to one root entity, caching joins
#[derive(Debug, Clone)]
pub struct PathResolver<'a> {
    inspector: PathInspector<'a>,
    root: &'a EntityType,
    root_alias: String,
    aliases: AliasSeq,
    cache: HashMap<String, JoinSpec>,
}

impl<'a> PathResolver<'a> {
    /// Resolver for a top-level query; the root table is referenced by name
    pub fn new(model: &'a DataModel, root: &'a EntityType) -> Self {
        Self::scoped(model, root, root.table_name.clone(), AliasSeq::new("alias_"))
    }

    /// Resolver rooted at an aliased table, drawing aliases from `aliases`
    pub fn scoped(
        model: &'a DataModel,
        root: &'a EntityType,
        root_alias: impl Into<String>,
        aliases: AliasSeq,
    ) -> Self {
        Self {
            inspector: PathInspector::new(model),
            root,
            root_alias: root_alias.into(),
            aliases,
            cache: HashMap::new(),
        }
    }

    pub fn root(&self) -> &'a EntityType {
        self.root
    }

    pub fn root_alias(&self) -> &str {
        &self.root_alias
    }

    pub fn inspector(&self) -> PathInspector<'a> {
        self.inspector
    }

    /// Hand the alias sequence back so an enclosing scope keeps aliases unique
    pub fn into_aliases(self) -> AliasSeq {
        self.aliases
    }

    /// Resolve `path` to a column or relation and the joins it needs
    pub fn resolve(&mut self, path: &str) -> Result<ResolvedPath> {
        let info = self.inspector.analyze_path(&self.root.name, path)?;
        let model = self.inspector.model();

        let crossed = match info.kind {
            PathKind::Attribute => info.relation_chain.len(),
            PathKind::Relation => info.relation_chain.len() - 1,
        };

        let mut owner = self.root;
        let mut owner_alias = self.root_alias.clone();
        let mut key = String::new();
        let mut joins = Vec::with_capacity(crossed);

        for step in &info.relation_chain[..crossed] {
            if !key.is_empty() {
                key.push('.');
            }
            key.push_str(&step.relation);

            let rel = owner.get_relation(&step.relation).ok_or_else(|| {
                StoreError::unknown_path(path, format!("relation '{}' vanished", step.relation))
            })?;
            let target = model.entity(&rel.target)?;

            let spec = match self.cache.get(&key).cloned() {
                Some(spec) => {
                    trace!(join = %key, alias = %spec.alias, "Reusing join");
                    spec
                }
                None => {
                    let spec = self.build_join(&key, owner, &owner_alias, rel, target)?;
                    self.cache.insert(key.clone(), spec.clone());
                    spec
                }
            };

            owner_alias = spec.alias.clone();
            owner = target;
            joins.push(spec);
        }

        let target = match info.kind {
            PathKind::Attribute => {
                let definition = info.attribute.clone().ok_or_else(|| {
                    StoreError::unknown_path(path, "attribute definition missing")
                })?;
                ResolvedTarget::Column {
                    column: ColumnRef::new(owner_alias, definition.name.clone()),
                    definition,
                }
            }
            PathKind::Relation => {
                let step = &info.relation_chain[crossed];
                let rel = owner.get_relation(&step.relation).ok_or_else(|| {
                    StoreError::unknown_path(path, format!("relation '{}' vanished", step.relation))
                })?;
                ResolvedTarget::Relation(RelationRef {
                    owner_alias,
                    owner: owner.name.clone(),
                    relation: rel.clone(),
                    cardinality: step.cardinality,
                    link: self.inspector.link(owner, rel)?,
                })
            }
        };

        Ok(ResolvedPath { info, target, joins })
    }

    fn build_join(
        &mut self,
        key: &str,
        owner: &EntityType,
        owner_alias: &str,
        rel: &RelationDefinition,
        target: &EntityType,
    ) -> Result<JoinSpec> {
        let (alias, joins) = match self.inspector.link(owner, rel)? {
            Link::Direct {
                owner_column,
                target_column,
            } => {
                let alias = self.aliases.next_alias();
                let join = Join {
                    target: TableRef::new(target.table_name.clone(), alias.clone()),
                    left: ColumnRef::new(owner_alias, owner_column),
                    right: ColumnRef::new(alias.clone(), target_column),
                };
                (alias, vec![join])
            }
            Link::Through {
                join_table,
                owner_key,
                target_key,
            } => {
                let link_alias = self.aliases.next_alias();
                let alias = self.aliases.next_alias();
                let joins = vec![
                    Join {
                        target: TableRef::new(join_table.table.clone(), link_alias.clone()),
                        left: ColumnRef::new(owner_alias, owner_key),
                        right: ColumnRef::new(link_alias.clone(), join_table.source_column.clone()),
                    },
                    Join {
                        target: TableRef::new(target.table_name.clone(), alias.clone()),
                        left: ColumnRef::new(link_alias, join_table.target_column.clone()),
                        right: ColumnRef::new(alias.clone(), target_key),
                    },
                ];
                (alias, joins)
            }
        };

        Ok(JoinSpec {
            key: key.to_string(),
            alias,
            joins,
        })
    }
}
