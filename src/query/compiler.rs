//! Table request compilation
//!
//! `QueryCompiler` turns a `TableRequest` into a parameterized row query and
//! a matching count query. Steps run in a fixed order: global filter, column
//! filters, sorting, count, pagination. A filter or sort key that cannot be
//! resolved is recorded as an `InvalidPath` and skipped; the rest of the
//! request still compiles.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Result, StoreError};
use crate::query::filters::{
    dispatch, BooleanFilter, DateFilter, FilterKind, ListFilter, NumberFilter, RelationFilter,
    TextFilter, ValueFilter,
};
use crate::query::inspector::PathInspector;
use crate::query::request::{FilterFn, Pagination, TableRequest};
use crate::query::resolver::{AliasSeq, JoinSpec, PathResolver, ResolvedTarget};
use crate::schema::{DataModel, EntityType};
use crate::sql::condition::{
    build_condition_clause, build_order_by_clause, ColumnRef, CompareOp, Condition, Join,
    OrderTerm, TableRef,
};
use crate::types::SqlCast;

/// Which step of compilation rejected a path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PathStage {
    Filter,
    Sort,
}

impl fmt::Display for PathStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStage::Filter => f.write_str("filter"),
            PathStage::Sort => f.write_str("sort"),
        }
    }
}

/// A request entry skipped during compilation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidPath {
    pub path: String,
    pub stage: PathStage,
    pub reason: String,
}

impl fmt::Display for InvalidPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.stage, self.path, self.reason)
    }
}

/// SQL text and its bind parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct SqlQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    /// Row query, paginated unless pagination was disabled
    pub select: SqlQuery,
    /// Row count of the filtered query before pagination
    pub count: SqlQuery,
    pub invalid_paths: Vec<InvalidPath>,
    /// Pagination applied to `select`
    pub pagination: Option<Pagination>,
}

/// Compiles table requests against one root entity
pub struct QueryCompiler<'a> {
    model: &'a DataModel,
    root: &'a EntityType,
    resolver: PathResolver<'a>,
    sub_aliases: AliasSeq,
    scope: Vec<Condition>,
    conditions: Vec<Condition>,
    joins: Vec<Join>,
    applied_joins: HashSet<String>,
    order: Vec<OrderTerm>,
    invalid_paths: Vec<InvalidPath>,
    paginate: bool,
}

impl<'a> QueryCompiler<'a> {
    /// Fails with `EntityNotFound` when `entity` is not registered
    pub fn new(model: &'a DataModel, entity: &str) -> Result<Self> {
        let root = model.entity(entity)?;
        Ok(Self {
            model,
            root,
            resolver: PathResolver::new(model, root),
            sub_aliases: AliasSeq::new("sub_"),
            scope: Vec::new(),
            conditions: Vec::new(),
            joins: Vec::new(),
            applied_joins: HashSet::new(),
            order: Vec::new(),
            invalid_paths: Vec::new(),
            paginate: true,
        })
    }

    /// Add a condition applied before any request filter
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.scope.push(condition);
        self
    }

    /// Hide rows whose boolean `column` is true
    pub fn exclude_soft_deleted(self, column: &str) -> Result<Self> {
        if !self.root.has_attribute(column) {
            return Err(StoreError::validation(format!(
                "{} has no soft-delete column '{}'",
                self.root.name, column
            )));
        }
        let column = ColumnRef::new(self.resolver.root_alias(), column);
        Ok(self.with_condition(Condition::any(vec![
            Condition::IsNull {
                column: column.clone(),
                negated: false,
            },
            Condition::compare(column, CompareOp::Eq, Value::Bool(false), SqlCast::Boolean),
        ])))
    }

    /// Leave LIMIT/OFFSET off the row query
    pub fn without_pagination(mut self) -> Self {
        self.paginate = false;
        self
    }

    pub fn compile(mut self, request: &TableRequest) -> CompiledQuery {
        self.apply_global_filter(request);
        self.apply_column_filters(request);
        self.apply_sorting(request);

        let where_clause = Condition::all(
            self.scope
                .iter()
                .cloned()
                .chain(self.conditions.iter().cloned())
                .collect(),
        );
        let mut offset = 1;
        let (clause, params) = build_condition_clause(&where_clause, &mut offset);

        let root_alias = self.resolver.root_alias().to_string();
        let columns = self
            .root
            .attributes
            .iter()
            .map(|a| ColumnRef::new(root_alias.as_str(), a.name.as_str()).to_sql())
            .collect::<Vec<_>>()
            .join(", ");

        let mut base = format!(
            "SELECT {} FROM {}",
            columns,
            TableRef::new(self.root.table_name.as_str(), root_alias.as_str()).to_sql()
        );
        for join in &self.joins {
            base.push(' ');
            base.push_str(&join.to_sql());
        }
        if where_clause != Condition::True {
            base.push_str(" WHERE ");
            base.push_str(&clause);
        }
        if !self.order.is_empty() {
            base.push_str(" ORDER BY ");
            base.push_str(&build_order_by_clause(&self.order));
        }

        let count = SqlQuery {
            sql: format!("SELECT COUNT(*) FROM ({}) AS counted", base),
            params: params.clone(),
        };

        let (select, pagination) = if self.paginate {
            let p = request.pagination;
            (
                format!("{} LIMIT {} OFFSET {}", base, p.page_size, p.offset()),
                Some(p),
            )
        } else {
            (base, None)
        };

        debug!(
            entity = %self.root.name,
            filters = self.conditions.len(),
            joins = self.joins.len(),
            invalid = self.invalid_paths.len(),
            "Compiled table request"
        );

        CompiledQuery {
            select: SqlQuery { sql: select, params },
            count,
            invalid_paths: self.invalid_paths,
            pagination,
        }
    }

    fn apply_global_filter(&mut self, request: &TableRequest) {
        let text = request.global_filter.as_str();
        if text.trim().is_empty() {
            return;
        }
        let root_alias = self.resolver.root_alias().to_string();
        let predicates: Vec<Condition> = self
            .root
            .text_attributes()
            .map(|a| {
                TextFilter.condition(
                    &ColumnRef::new(root_alias.as_str(), a.name.as_str()),
                    &FilterFn::Contains,
                    text,
                )
            })
            .collect();
        if predicates.is_empty() {
            debug!(entity = %self.root.name, "No text attributes for global filter");
            return;
        }
        debug!(
            columns = predicates.len(),
            requested_fn = %request.global_filter_fn,
            "Applying global filter"
        );
        self.conditions.push(Condition::any(predicates));
    }

    fn apply_column_filters(&mut self, request: &TableRequest) {
        for filter in &request.column_filters {
            let op = request.filter_fn_for(&filter.id);
            if op == FilterFn::Custom {
                debug!(path = %filter.id, "Skipping custom filter");
                continue;
            }
            match self.filter_condition(&filter.id, &op, &filter.value) {
                Ok(condition) => {
                    debug!(path = %filter.id, op = %op, "Applied filter");
                    self.conditions.push(condition);
                }
                Err(e) => self.reject(&filter.id, PathStage::Filter, e),
            }
        }
    }

    fn filter_condition(&mut self, path: &str, op: &FilterFn, value: &Value) -> Result<Condition> {
        let resolved = self.resolver.resolve(path)?;
        let kind = dispatch(&resolved.info, op);

        let condition = match (&resolved.target, kind) {
            (ResolvedTarget::Relation(relation), FilterKind::Relation) => RelationFilter.apply(
                self.model,
                &self.root.name,
                relation,
                op,
                value,
                &mut self.sub_aliases,
            )?,
            (ResolvedTarget::Relation(_), _) => {
                return Err(StoreError::invalid_filter(format!(
                    "'{}' is a relation; use hasAny, hasAll, hasChild or hasNotChild",
                    path
                )));
            }
            (ResolvedTarget::Column { column, definition }, kind) => {
                let filter: &dyn ValueFilter = match kind {
                    FilterKind::Number => &NumberFilter,
                    FilterKind::Date => &DateFilter,
                    FilterKind::Boolean => &BooleanFilter,
                    FilterKind::List => &ListFilter,
                    _ => &TextFilter,
                };
                let op = if kind == FilterKind::Fuzzy { &FilterFn::Fuzzy } else { op };
                filter.apply(column, definition, op, value)?
            }
        };

        self.attach_joins(resolved.joins);
        Ok(condition)
    }

    fn apply_sorting(&mut self, request: &TableRequest) {
        for sort in &request.sorting {
            match self.resolver.resolve(&sort.id) {
                Ok(resolved) => match resolved.target {
                    ResolvedTarget::Column { column, .. } => {
                        self.attach_joins(resolved.joins);
                        self.order.push(OrderTerm {
                            column,
                            descending: sort.desc,
                        });
                    }
                    ResolvedTarget::Relation(_) => self.reject(
                        &sort.id,
                        PathStage::Sort,
                        StoreError::unknown_path(sort.id.as_str(), "cannot sort by a relation"),
                    ),
                },
                Err(e) => self.reject(&sort.id, PathStage::Sort, e),
            }
        }
    }

    fn attach_joins(&mut self, specs: Vec<JoinSpec>) {
        for spec in specs {
            if self.applied_joins.insert(spec.key) {
                self.joins.extend(spec.joins);
            }
        }
    }

    fn reject(&mut self, path: &str, stage: PathStage, error: StoreError) {
        warn!(path = %path, stage = %stage, error = %error, "Skipping invalid path");
        self.invalid_paths.push(InvalidPath {
            path: path.to_string(),
            stage,
            reason: error.to_string(),
        });
    }

    /// Check every filter and sort path of `request` without compiling it
    pub fn validate_paths(
        model: &DataModel,
        entity: &str,
        request: &TableRequest,
    ) -> Result<Vec<InvalidPath>> {
        model.entity(entity)?;
        let inspector = PathInspector::new(model);
        let mut invalid = Vec::new();

        for filter in &request.column_filters {
            if let Err(e) = inspector.analyze_path(entity, &filter.id) {
                invalid.push(InvalidPath {
                    path: filter.id.clone(),
                    stage: PathStage::Filter,
                    reason: e.to_string(),
                });
            }
        }
        for sort in &request.sorting {
            let reason = match inspector.analyze_path(entity, &sort.id) {
                Ok(info) if info.is_relation() => Some("cannot sort by a relation".to_string()),
                Ok(_) => None,
                Err(e) => Some(e.to_string()),
            };
            if let Some(reason) = reason {
                invalid.push(InvalidPath {
                    path: sort.id.clone(),
                    stage: PathStage::Sort,
                    reason,
                });
            }
        }
        Ok(invalid)
    }
}
