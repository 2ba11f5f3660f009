//! Operator filters
//!
//! Each filter owns a fixed operator vocabulary. The compiler picks one
//! filter per column filter through `dispatch`, a priority table keyed by
//! path kind and semantic type, then asks that filter for a `Condition`.

pub mod boolean;
pub mod date;
pub mod list;
pub mod number;
pub mod relation;
pub mod text;

pub use boolean::BooleanFilter;
pub use date::DateFilter;
pub use list::ListFilter;
pub use number::NumberFilter;
pub use relation::{RelationCondition, RelationFilter, SubOperator};
pub use text::TextFilter;

use serde_json::Value;

use crate::error::Result;
use crate::query::inspector::{PathInfo, PathKind};
use crate::query::request::FilterFn;
use crate::sql::condition::{ColumnRef, CompareOp, Condition};
use crate::types::{ColumnDefinition, SemanticType, SqlCast};

/// A fixed operator vocabulary
pub trait OperatorSet {
    fn operators(&self) -> &'static [FilterFn];

    fn supports(&self, op: &FilterFn) -> bool {
        self.operators().contains(op)
    }
}

/// A filter producing a predicate over a single column
pub trait ValueFilter: OperatorSet {
    fn apply(
        &self,
        column: &ColumnRef,
        definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition>;
}

/// Filter handlers, in dispatch priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Relation,
    Number,
    Date,
    Boolean,
    List,
    Text,
    /// Nothing claimed the operator: text fuzzy match
    Fuzzy,
}

impl FilterKind {
    pub fn operators(&self) -> &'static [FilterFn] {
        match self {
            FilterKind::Relation => RelationFilter.operators(),
            FilterKind::Number => NumberFilter.operators(),
            FilterKind::Date => DateFilter.operators(),
            FilterKind::Boolean => BooleanFilter.operators(),
            FilterKind::List => ListFilter.operators(),
            FilterKind::Text => TextFilter.operators(),
            FilterKind::Fuzzy => &[],
        }
    }

    pub fn supports(&self, op: &FilterFn) -> bool {
        self.operators().contains(op)
    }
}

#[derive(Debug, Clone, Copy)]
enum Applies {
    Relation,
    Semantic(SemanticType),
    Attribute,
}

impl Applies {
    fn matches(&self, info: &PathInfo) -> bool {
        match self {
            Applies::Relation => info.kind == PathKind::Relation,
            Applies::Semantic(t) => info.semantic_type == Some(*t),
            Applies::Attribute => info.kind == PathKind::Attribute,
        }
    }
}

const DISPATCH: &[(Applies, FilterKind)] = &[
    (Applies::Relation, FilterKind::Relation),
    (Applies::Semantic(SemanticType::Number), FilterKind::Number),
    (Applies::Semantic(SemanticType::Date), FilterKind::Date),
    (Applies::Semantic(SemanticType::Boolean), FilterKind::Boolean),
    (Applies::Attribute, FilterKind::List),
    (Applies::Attribute, FilterKind::Text),
];

/// Pick the filter for `op` on the analyzed path
pub fn dispatch(info: &PathInfo, op: &FilterFn) -> FilterKind {
    DISPATCH
        .iter()
        .find(|(applies, kind)| applies.matches(info) && kind.supports(op))
        .map(|(_, kind)| *kind)
        .unwrap_or(FilterKind::Fuzzy)
}

/// Null or a whitespace-only string
pub(crate) fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Comparison operator behind a comparison filter name
pub(crate) fn compare_op(op: &FilterFn) -> Option<CompareOp> {
    match op {
        FilterFn::Equals => Some(CompareOp::Eq),
        FilterFn::NotEquals => Some(CompareOp::Ne),
        FilterFn::LessThan => Some(CompareOp::Lt),
        FilterFn::LessThanOrEqualTo => Some(CompareOp::Lte),
        FilterFn::GreaterThan => Some(CompareOp::Gt),
        FilterFn::GreaterThanOrEqualTo => Some(CompareOp::Gte),
        _ => None,
    }
}

/// Range with optional bounds.
///
/// No bounds is always true; a single bound is an inclusive one-sided
/// comparison; two bounds are strict unless `inclusive`.
pub(crate) fn range_condition(
    column: &ColumnRef,
    cast: SqlCast,
    lower: Option<Value>,
    upper: Option<Value>,
    inclusive: bool,
) -> Condition {
    match (lower, upper) {
        (None, None) => Condition::True,
        (Some(lower), None) => Condition::compare(column.clone(), CompareOp::Gte, lower, cast),
        (None, Some(upper)) => Condition::compare(column.clone(), CompareOp::Lte, upper, cast),
        (Some(lower), Some(upper)) => {
            let (lo, hi) = if inclusive {
                (CompareOp::Gte, CompareOp::Lte)
            } else {
                (CompareOp::Gt, CompareOp::Lt)
            };
            Condition::all(vec![
                Condition::compare(column.clone(), lo, lower, cast),
                Condition::compare(column.clone(), hi, upper, cast),
            ])
        }
    }
}

/// `column op value`, where a null value becomes IS [NOT] NULL
pub(crate) fn null_aware_compare(
    column: &ColumnRef,
    op: CompareOp,
    value: Value,
    cast: SqlCast,
) -> Option<Condition> {
    match (value, op) {
        (Value::Null, CompareOp::Eq) => Some(Condition::IsNull {
            column: column.clone(),
            negated: false,
        }),
        (Value::Null, CompareOp::Ne) => Some(Condition::IsNull {
            column: column.clone(),
            negated: true,
        }),
        (Value::Null, _) => None,
        (value, op) => Some(Condition::compare(column.clone(), op, value, cast)),
    }
}
