//! Path and relation inspection
//!
//! `PathInspector` answers questions about a dotted path on an entity type:
//! is it an attribute or a relation, what is its semantic type, which
//! relations does it cross. It also decides the cardinality of relations
//! whose metadata is incomplete and derives their join columns.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{Result, StoreError};
use crate::schema::{Cardinality, DataModel, EntityType, JoinTable, RelationDefinition, snake_case};
use crate::sql::sanitize::split_path;
use crate::types::{ColumnDefinition, SemanticType};

/// Whether a path ends on an attribute or on a relation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Attribute,
    Relation,
}

/// One relation crossed by a path
#[derive(Debug, Clone, PartialEq)]
pub struct RelationStep {
    /// Entity type declaring the relation
    pub owner: String,
    pub relation: String,
    pub target: String,
    pub cardinality: Cardinality,
}

/// Result of analyzing a path
#[derive(Debug, Clone, PartialEq)]
pub struct PathInfo {
    pub path: String,
    pub kind: PathKind,
    /// `None` for relation paths
    pub semantic_type: Option<SemanticType>,
    /// Whether the path crosses at least one relation before its last segment
    pub is_nested: bool,
    /// Relations crossed, including the final one for relation paths
    pub relation_chain: Vec<RelationStep>,
    /// Entity type the last segment resolves to: the owner of the attribute,
    /// or the target of the final relation
    pub target_entity: String,
    pub attribute: Option<ColumnDefinition>,
}

impl PathInfo {
    pub fn is_relation(&self) -> bool {
        self.kind == PathKind::Relation
    }
}

/// Join columns between the owner and target of a relation
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    /// `owner.owner_column = target.target_column`
    Direct {
        owner_column: String,
        target_column: String,
    },
    /// Through an association table
    Through {
        join_table: JoinTable,
        owner_key: String,
        target_key: String,
    },
}

/// Inspects paths and relations against a data model
#[derive(Debug, Clone, Copy)]
pub struct PathInspector<'a> {
    model: &'a DataModel,
}

impl<'a> PathInspector<'a> {
    pub fn new(model: &'a DataModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &'a DataModel {
        self.model
    }

    /// Analyze `path` relative to `entity`.
    ///
    /// Every segment but the last must be a relation; the last may be an
    /// attribute or a relation.
    pub fn analyze_path(&self, entity: &str, path: &str) -> Result<PathInfo> {
        let segments = split_path(path).map_err(|e| StoreError::unknown_path(path, e))?;
        let mut current = self
            .model
            .entity(entity)
            .map_err(|_| StoreError::unknown_path(path, format!("unknown entity '{}'", entity)))?;

        let (last, prefix) = segments
            .split_last()
            .ok_or_else(|| StoreError::unknown_path(path, "empty path"))?;

        let mut chain = Vec::with_capacity(segments.len());
        for segment in prefix {
            let Some(rel) = current.get_relation(segment) else {
                let reason = if current.has_attribute(segment) {
                    format!("'{}' on {} is an attribute, not a relation", segment, current.name)
                } else {
                    format!("relation '{}' does not exist on {}", segment, current.name)
                };
                return Err(StoreError::unknown_path(path, reason));
            };
            chain.push(self.step(current, rel)?);
            current = self.target_of(path, rel)?;
        }

        let is_nested = !prefix.is_empty();
        if let Some(attr) = current.get_attribute(last) {
            return Ok(PathInfo {
                path: path.to_string(),
                kind: PathKind::Attribute,
                semantic_type: Some(attr.semantic_type()),
                is_nested,
                relation_chain: chain,
                target_entity: current.name.clone(),
                attribute: Some(attr.clone()),
            });
        }

        if let Some(rel) = current.get_relation(last) {
            chain.push(self.step(current, rel)?);
            return Ok(PathInfo {
                path: path.to_string(),
                kind: PathKind::Relation,
                semantic_type: None,
                is_nested,
                relation_chain: chain,
                target_entity: rel.target.clone(),
                attribute: None,
            });
        }

        Err(StoreError::unknown_path(
            path,
            format!("attribute '{}' does not exist on {}", last, current.name),
        ))
    }

    fn step(&self, owner: &EntityType, rel: &RelationDefinition) -> Result<RelationStep> {
        Ok(RelationStep {
            owner: owner.name.clone(),
            relation: rel.name.clone(),
            target: rel.target.clone(),
            cardinality: self.cardinality(owner, rel)?,
        })
    }

    fn target_of(&self, path: &str, rel: &RelationDefinition) -> Result<&'a EntityType> {
        self.model.entity(&rel.target).map_err(|_| {
            StoreError::unknown_path(
                path,
                format!("target '{}' of relation '{}' is not registered", rel.target, rel.name),
            )
        })
    }

    /// Cardinality of `rel` seen from `owner`.
    ///
    /// Tries, in order: explicit cardinality, a join table, the collection
    /// flag combined with the inverse relation, the collection flag alone,
    /// a foreign key column on the owner. Anything else is many-to-one.
    pub fn cardinality(&self, owner: &EntityType, rel: &RelationDefinition) -> Result<Cardinality> {
        if let Some(c) = rel.cardinality {
            return Ok(c);
        }
        if rel.through.is_some() {
            return Ok(Cardinality::ManyToMany);
        }

        if let Some(collection) = rel.collection {
            if let Some(back) = self.back_reference(rel) {
                let back_collection = back
                    .collection
                    .or_else(|| back.cardinality.map(|c| c.is_to_many()));
                if let Some(back_collection) = back_collection {
                    return Ok(match (collection, back_collection) {
                        (false, false) => Cardinality::OneToOne,
                        (false, true) => Cardinality::ManyToOne,
                        (true, false) => Cardinality::OneToMany,
                        (true, true) => Cardinality::ManyToMany,
                    });
                }
            }
            return Ok(if collection {
                Cardinality::OneToMany
            } else {
                Cardinality::ManyToOne
            });
        }

        let singular = rel.name.trim_end_matches('s');
        let candidates = [
            format!("{}_idx", rel.name),
            format!("{}_id", rel.name),
            format!("{}_id", singular),
        ];
        if candidates.iter().any(|c| owner.has_attribute(c)) {
            return Ok(Cardinality::ManyToOne);
        }

        debug!(
            entity = %owner.name,
            relation = %rel.name,
            "Could not determine cardinality, assuming many-to-one"
        );
        Ok(Cardinality::ManyToOne)
    }

    /// The inverse relation named by `back_populates`, if it exists
    pub fn back_reference(&self, rel: &RelationDefinition) -> Option<&'a RelationDefinition> {
        let name = rel.back_populates.as_deref()?;
        self.model.get(&rel.target)?.get_relation(name)
    }

    /// Join columns for `rel`
    pub fn link(&self, owner: &EntityType, rel: &RelationDefinition) -> Result<Link> {
        let target = self.model.entity(&rel.target)?;
        let back_fk = self.back_reference(rel).and_then(|b| b.foreign_key.clone());

        match self.cardinality(owner, rel)? {
            Cardinality::ManyToOne => Ok(Link::Direct {
                owner_column: rel
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", rel.name)),
                target_column: target.primary_key.clone(),
            }),
            Cardinality::OneToMany => Ok(Link::Direct {
                owner_column: owner.primary_key.clone(),
                target_column: rel
                    .foreign_key
                    .clone()
                    .or(back_fk)
                    .unwrap_or_else(|| format!("{}_id", snake_case(&owner.name))),
            }),
            Cardinality::OneToOne => {
                let owner_side = rel
                    .foreign_key
                    .clone()
                    .unwrap_or_else(|| format!("{}_id", rel.name));
                if owner.has_attribute(&owner_side) {
                    Ok(Link::Direct {
                        owner_column: owner_side,
                        target_column: target.primary_key.clone(),
                    })
                } else {
                    Ok(Link::Direct {
                        owner_column: owner.primary_key.clone(),
                        target_column: rel
                            .foreign_key
                            .clone()
                            .or(back_fk)
                            .unwrap_or_else(|| format!("{}_id", snake_case(&owner.name))),
                    })
                }
            }
            Cardinality::ManyToMany => {
                let join_table = rel.through.clone().ok_or_else(|| {
                    StoreError::unsupported_relation(format!(
                        "{}.{} is many-to-many without a join table",
                        owner.name, rel.name
                    ))
                })?;
                Ok(Link::Through {
                    join_table,
                    owner_key: owner.primary_key.clone(),
                    target_key: target.primary_key.clone(),
                })
            }
        }
    }

    /// Every path reachable from `entity`, sorted.
    ///
    /// Lists attributes and relations, then follows single-valued relations
    /// up to `max_depth` segments. Entity types already on the current walk
    /// are not entered again.
    pub fn available_paths(&self, entity: &str, max_depth: usize) -> Result<Vec<String>> {
        let root = self.model.entity(entity)?;
        let mut paths = Vec::new();
        let mut visited = HashSet::new();
        self.collect_paths(root, "", max_depth.max(1), &mut visited, &mut paths)?;
        paths.sort();
        Ok(paths)
    }

    fn collect_paths(
        &self,
        entity: &'a EntityType,
        prefix: &str,
        depth: usize,
        visited: &mut HashSet<&'a str>,
        paths: &mut Vec<String>,
    ) -> Result<()> {
        visited.insert(entity.name.as_str());
        for attr in &entity.attributes {
            paths.push(format!("{}{}", prefix, attr.name));
        }
        for rel in &entity.relations {
            paths.push(format!("{}{}", prefix, rel.name));
            if depth <= 1 {
                continue;
            }
            let cardinality = self.cardinality(entity, rel)?;
            if cardinality.is_to_many() {
                continue;
            }
            let Some(target) = self.model.get(&rel.target) else {
                continue;
            };
            if visited.contains(target.name.as_str()) {
                continue;
            }
            let nested = format!("{}{}.", prefix, rel.name);
            self.collect_paths(target, &nested, depth - 1, visited, paths)?;
        }
        visited.remove(entity.name.as_str());
        Ok(())
    }
}
