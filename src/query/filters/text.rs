use serde_json::Value;

use crate::error::Result;
use crate::query::filters::{OperatorSet, ValueFilter};
use crate::query::request::FilterFn;
use crate::sql::condition::{json_value_to_string, ColumnRef, CompareOp, Condition};
use crate::types::{ColumnDefinition, SqlCast};

const TEXT_OPERATORS: &[FilterFn] = &[
    FilterFn::Equals,
    FilterFn::NotEquals,
    FilterFn::LessThan,
    FilterFn::LessThanOrEqualTo,
    FilterFn::GreaterThan,
    FilterFn::GreaterThanOrEqualTo,
    FilterFn::Contains,
    FilterFn::NotContains,
    FilterFn::StartsWith,
    FilterFn::EndsWith,
    FilterFn::Fuzzy,
];

/// Text matching over the column cast to text.
///
/// Substring operators are case-insensitive. Operators without a text
/// meaning, ordering comparisons included, match as `contains`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextFilter;

impl OperatorSet for TextFilter {
    fn operators(&self) -> &'static [FilterFn] {
        TEXT_OPERATORS
    }
}

impl ValueFilter for TextFilter {
    fn apply(
        &self,
        column: &ColumnRef,
        _definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition> {
        Ok(self.condition(column, op, &text_of(value)))
    }
}

impl TextFilter {
    pub fn condition(&self, column: &ColumnRef, op: &FilterFn, text: &str) -> Condition {
        let column = column.clone();
        match op {
            FilterFn::Equals => {
                Condition::compare(column, CompareOp::Eq, Value::from(text), SqlCast::Text)
            }
            FilterFn::NotEquals => {
                Condition::compare(column, CompareOp::Ne, Value::from(text), SqlCast::Text)
            }
            FilterFn::NotContains => Condition::not_ilike(column, format!("%{}%", text)),
            FilterFn::StartsWith => Condition::ilike(column, format!("{}%", text)),
            FilterFn::EndsWith => Condition::ilike(column, format!("%{}", text)),
            FilterFn::Fuzzy => Condition::all(
                text.split_whitespace()
                    .map(|word| Condition::ilike(column.clone(), format!("%{}%", word)))
                    .collect(),
            ),
            _ => Condition::ilike(column, format!("%{}%", text)),
        }
    }
}

fn text_of(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        other => json_value_to_string(other),
    }
}
