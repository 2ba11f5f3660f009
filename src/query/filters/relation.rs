//! Relation quantifier filters
//!
//! `hasAny`, `hasAll`, `hasChild` and `hasNotChild` become correlated
//! EXISTS subqueries over the related table. Sub-condition columns may
//! cross further relations; those joins live inside the subquery.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::query::filters::{null_aware_compare, OperatorSet};
use crate::query::inspector::{Link, PathInspector};
use crate::query::request::FilterFn;
use crate::query::resolver::{AliasSeq, PathResolver, RelationRef, ResolvedTarget};
use crate::schema::{DataModel, EntityType};
use crate::sql::condition::{ColumnRef, CompareOp, Condition, Join, Subquery, TableRef};
use crate::types::ColumnDefinition;

const RELATION_OPERATORS: &[FilterFn] = &[
    FilterFn::HasAny,
    FilterFn::HasAll,
    FilterFn::HasChild,
    FilterFn::HasNotChild,
];

/// Operators usable inside a relation sub-condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    In,
    NotIn,
    IsNull,
}

impl SubOperator {
    /// The operator matching exactly the rows this one rejects.
    /// `isNull` is its own inverse; its value is flipped instead.
    pub fn inverted(self) -> Self {
        match self {
            SubOperator::Equals => SubOperator::NotEquals,
            SubOperator::NotEquals => SubOperator::Equals,
            SubOperator::Contains => SubOperator::NotContains,
            SubOperator::NotContains => SubOperator::Contains,
            SubOperator::GreaterThan => SubOperator::LessThanOrEqual,
            SubOperator::LessThan => SubOperator::GreaterThanOrEqual,
            SubOperator::GreaterThanOrEqual => SubOperator::LessThan,
            SubOperator::LessThanOrEqual => SubOperator::GreaterThan,
            SubOperator::In => SubOperator::NotIn,
            SubOperator::NotIn => SubOperator::In,
            SubOperator::IsNull => SubOperator::IsNull,
        }
    }
}

/// One sub-condition on the related entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCondition {
    /// Path relative to the related entity
    pub column: String,
    pub operator: SubOperator,
    #[serde(default)]
    pub value: Value,
}

impl RelationCondition {
    pub fn new(column: impl Into<String>, operator: SubOperator, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    /// The condition a row violating this one satisfies
    pub fn inverted(&self) -> Self {
        let value = match self.operator {
            SubOperator::IsNull => Value::Bool(self.value != Value::Bool(true)),
            _ => self.value.clone(),
        };
        Self {
            column: self.column.clone(),
            operator: self.operator.inverted(),
            value,
        }
    }
}

/// Quantified filters over a relation
#[derive(Debug, Default, Clone, Copy)]
pub struct RelationFilter;

impl OperatorSet for RelationFilter {
    fn operators(&self) -> &'static [FilterFn] {
        RELATION_OPERATORS
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combine {
    /// Row satisfies every condition
    All,
    /// Row satisfies at least one condition
    Any,
}

impl RelationFilter {
    /// Build the predicate for `op` on `relation`.
    ///
    /// `root_entity` is the entity of the outer query; sub-condition paths
    /// leading back to it are tested one EXISTS per condition.
    pub fn apply(
        &self,
        model: &DataModel,
        root_entity: &str,
        relation: &RelationRef,
        op: &FilterFn,
        value: &Value,
        aliases: &mut AliasSeq,
    ) -> Result<Condition> {
        let target = model.entity(&relation.relation.target)?;
        let scope = Scope {
            model,
            relation,
            target,
        };

        match op {
            FilterFn::HasChild => {
                debug!(relation = %relation.relation.name, "Applying hasChild");
                Ok(Condition::exists(scope.subquery(&[], Combine::All, aliases)?))
            }
            FilterFn::HasNotChild => {
                debug!(relation = %relation.relation.name, "Applying hasNotChild");
                Ok(Condition::exists(scope.subquery(&[], Combine::All, aliases)?).negate())
            }
            FilterFn::HasAny => {
                let conditions = parse_conditions(value)?;
                let self_ref = scope.is_self_reference(root_entity, &conditions)?;
                debug!(relation = %relation.relation.name, self_ref, "Applying hasAny");
                if self_ref {
                    let mut tests = Vec::with_capacity(conditions.len());
                    for c in &conditions {
                        let sub = scope.subquery(std::slice::from_ref(c), Combine::All, aliases)?;
                        tests.push(Condition::exists(sub));
                    }
                    Ok(Condition::all(tests))
                } else {
                    Ok(Condition::exists(scope.subquery(&conditions, Combine::All, aliases)?))
                }
            }
            FilterFn::HasAll => {
                let conditions = parse_conditions(value)?;
                let self_ref = scope.is_self_reference(root_entity, &conditions)?;
                debug!(relation = %relation.relation.name, self_ref, "Applying hasAll");
                let violations: Vec<RelationCondition> =
                    conditions.iter().map(RelationCondition::inverted).collect();

                let mut tests = vec![Condition::exists(scope.subquery(&[], Combine::All, aliases)?)];
                if self_ref {
                    for v in &violations {
                        let sub = scope.subquery(std::slice::from_ref(v), Combine::All, aliases)?;
                        tests.push(Condition::exists(sub).negate());
                    }
                } else if !violations.is_empty() {
                    let sub = scope.subquery(&violations, Combine::Any, aliases)?;
                    tests.push(Condition::exists(sub).negate());
                }
                Ok(Condition::all(tests))
            }
            other => Err(StoreError::invalid_filter(format!(
                "Unsupported relation operator: {}",
                other
            ))),
        }
    }
}

struct Scope<'a> {
    model: &'a DataModel,
    relation: &'a RelationRef,
    target: &'a EntityType,
}

impl<'a> Scope<'a> {
    /// Whether any nested sub-condition path ends on `root_entity`
    fn is_self_reference(&self, root_entity: &str, conditions: &[RelationCondition]) -> Result<bool> {
        let inspector = PathInspector::new(self.model);
        for c in conditions {
            let info = inspector.analyze_path(&self.target.name, &c.column)?;
            if info.is_nested && info.target_entity == root_entity {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rows of the related table correlated with the outer row, filtered by
    /// `conditions`
    fn subquery(
        &self,
        conditions: &[RelationCondition],
        combine: Combine,
        aliases: &mut AliasSeq,
    ) -> Result<Subquery> {
        let owner_alias = &self.relation.owner_alias;
        let (from, mut joins, target_alias, correlation) = match &self.relation.link {
            Link::Direct {
                owner_column,
                target_column,
            } => {
                let alias = aliases.next_alias();
                let correlation = Condition::ColumnsEqual(
                    ColumnRef::new(alias.clone(), target_column.clone()),
                    ColumnRef::new(owner_alias.clone(), owner_column.clone()),
                );
                (
                    TableRef::new(self.target.table_name.clone(), alias.clone()),
                    Vec::new(),
                    alias,
                    correlation,
                )
            }
            Link::Through {
                join_table,
                owner_key,
                target_key,
            } => {
                let link_alias = aliases.next_alias();
                let alias = aliases.next_alias();
                let join = Join {
                    target: TableRef::new(self.target.table_name.clone(), alias.clone()),
                    left: ColumnRef::new(link_alias.clone(), join_table.target_column.clone()),
                    right: ColumnRef::new(alias.clone(), target_key.clone()),
                };
                let correlation = Condition::ColumnsEqual(
                    ColumnRef::new(link_alias.clone(), join_table.source_column.clone()),
                    ColumnRef::new(owner_alias.clone(), owner_key.clone()),
                );
                (
                    TableRef::new(join_table.table.clone(), link_alias),
                    vec![join],
                    alias,
                    correlation,
                )
            }
        };

        let mut resolver =
            PathResolver::scoped(self.model, self.target, target_alias, aliases.clone());
        let mut applied = HashSet::new();
        let mut predicates = Vec::with_capacity(conditions.len());
        for c in conditions {
            let resolved = resolver.resolve(&c.column)?;
            for spec in resolved.joins {
                if applied.insert(spec.key.clone()) {
                    joins.extend(spec.joins);
                }
            }
            let ResolvedTarget::Column { column, definition } = resolved.target else {
                return Err(StoreError::invalid_filter(format!(
                    "Relation sub-condition '{}' must end on an attribute",
                    c.column
                )));
            };
            predicates.push(sub_condition(&column, &definition, c)?);
        }
        *aliases = resolver.into_aliases();

        let filtered = match combine {
            Combine::All => Condition::all(predicates),
            Combine::Any => Condition::any(predicates),
        };
        Ok(Subquery {
            from,
            joins,
            filter: Condition::all(vec![correlation, filtered]),
        })
    }
}

fn parse_conditions(value: &Value) -> Result<Vec<RelationCondition>> {
    let parsed = match value {
        Value::Array(_) => serde_json::from_value(value.clone()),
        Value::Object(_) => serde_json::from_value(value.clone()).map(|c| vec![c]),
        other => {
            return Err(StoreError::invalid_filter(format!(
                "Relation filter expects a list of {{column, operator, value}}, got {}",
                other
            )));
        }
    };
    let conditions: Vec<RelationCondition> =
        parsed.map_err(|e| StoreError::invalid_filter(format!("Invalid relation condition: {}", e)))?;
    if let Some(c) = conditions.iter().find(|c| c.column.is_empty()) {
        return Err(StoreError::invalid_filter(format!(
            "Relation condition {:?} has no column",
            c
        )));
    }
    Ok(conditions)
}

fn as_list(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        scalar => vec![scalar.clone()],
    }
}

/// Predicate for one sub-condition. Substring matches are case-sensitive.
fn sub_condition(
    column: &ColumnRef,
    definition: &ColumnDefinition,
    c: &RelationCondition,
) -> Result<Condition> {
    let cast = definition.column_type.sql_cast();
    let compare = |op: CompareOp| {
        null_aware_compare(column, op, c.value.clone(), cast).ok_or_else(|| {
            StoreError::invalid_filter(format!("{:?} on '{}' requires a value", c.operator, c.column))
        })
    };
    let like = |negated: bool| Condition::Like {
        column: column.clone(),
        pattern: format!("%{}%", crate::sql::condition::json_value_to_string(&c.value)),
        case_insensitive: false,
        negated,
    };

    match c.operator {
        SubOperator::Equals => compare(CompareOp::Eq),
        SubOperator::NotEquals => compare(CompareOp::Ne),
        SubOperator::GreaterThan => compare(CompareOp::Gt),
        SubOperator::LessThan => compare(CompareOp::Lt),
        SubOperator::GreaterThanOrEqual => compare(CompareOp::Gte),
        SubOperator::LessThanOrEqual => compare(CompareOp::Lte),
        SubOperator::Contains => Ok(like(false)),
        SubOperator::NotContains => Ok(like(true)),
        SubOperator::In => Ok(Condition::in_list(column.clone(), as_list(&c.value), cast)),
        SubOperator::NotIn => Ok(Condition::not_in_list(column.clone(), as_list(&c.value), cast)),
        SubOperator::IsNull => Ok(Condition::IsNull {
            column: column.clone(),
            negated: c.value != Value::Bool(true),
        }),
    }
}
