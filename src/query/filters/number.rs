use std::str::FromStr;

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::query::filters::{
    compare_op, is_blank, null_aware_compare, range_condition, OperatorSet, ValueFilter,
};
use crate::query::request::FilterFn;
use crate::sql::condition::{ColumnRef, CompareOp, Condition};
use crate::types::ColumnDefinition;

const NUMBER_OPERATORS: &[FilterFn] = &[
    FilterFn::Equals,
    FilterFn::NotEquals,
    FilterFn::LessThan,
    FilterFn::LessThanOrEqualTo,
    FilterFn::GreaterThan,
    FilterFn::GreaterThanOrEqualTo,
    FilterFn::Between,
    FilterFn::BetweenInclusive,
];

/// Numeric comparisons and ranges.
///
/// Values may be JSON numbers or numeric strings. A two-element list with
/// `between`/`betweenInclusive` is a range; any other list compares against
/// its first element. Unknown operators compare for equality.
#[derive(Debug, Default, Clone, Copy)]
pub struct NumberFilter;

impl OperatorSet for NumberFilter {
    fn operators(&self) -> &'static [FilterFn] {
        NUMBER_OPERATORS
    }
}

impl ValueFilter for NumberFilter {
    fn apply(
        &self,
        column: &ColumnRef,
        definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition> {
        let cast = definition.column_type.sql_cast();
        let op = if self.supports(op) { op } else { &FilterFn::Equals };
        let is_range = matches!(op, FilterFn::Between | FilterFn::BetweenInclusive);

        let single = match value {
            Value::Array(items) if items.len() == 2 && is_range => {
                let lower = bound(&items[0])?;
                let upper = bound(&items[1])?;
                return Ok(range_condition(
                    column,
                    cast,
                    lower,
                    upper,
                    *op == FilterFn::BetweenInclusive,
                ));
            }
            Value::Array(items) => items.first().cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };

        let cmp = compare_op(op).unwrap_or(CompareOp::Eq);
        let operand = if single.is_null() {
            Value::Null
        } else {
            parse_number(&single)?
        };
        null_aware_compare(column, cmp, operand, cast).ok_or_else(|| {
            StoreError::invalid_filter(format!(
                "{} on '{}' requires a value",
                op, definition.name
            ))
        })
    }
}

fn bound(value: &Value) -> Result<Option<Value>> {
    if is_blank(value) {
        Ok(None)
    } else {
        parse_number(value).map(Some)
    }
}

/// Normalize a JSON number or numeric string to its decimal text
fn parse_number(value: &Value) -> Result<Value> {
    match value {
        Value::Number(n) => Ok(Value::String(n.to_string())),
        Value::String(s) => Decimal::from_str(s.trim())
            .or_else(|_| Decimal::from_scientific(s.trim()))
            .map(|d| Value::String(d.normalize().to_string()))
            .map_err(|_| StoreError::invalid_filter(format!("'{}' is not a number", s))),
        other => Err(StoreError::invalid_filter(format!(
            "{} is not a number",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::condition::build_condition_clause;
    use crate::types::ColumnType;
    use serde_json::json;

    fn render(op: FilterFn, value: Value) -> Result<(String, Vec<Value>)> {
        let column = ColumnRef::new("tasks", "estimate");
        let definition = ColumnDefinition::new("estimate", ColumnType::Integer);
        let condition = NumberFilter.apply(&column, &definition, &op, &value)?;
        let mut offset = 1;
        Ok(build_condition_clause(&condition, &mut offset))
    }

    // ==================== Comparisons ====================

    #[test]
    fn test_comparisons() {
        let (sql, params) = render(FilterFn::GreaterThanOrEqualTo, json!(5)).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" >= $1::numeric");
        assert_eq!(params, vec![json!("5")]);

        let (sql, params) = render(FilterFn::LessThan, json!("2.50")).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" < $1::numeric");
        assert_eq!(params, vec![json!("2.5")]);
    }

    #[test]
    fn test_unknown_operator_is_equals() {
        let (sql, _) = render(FilterFn::Other("approx".into()), json!(3)).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" = $1::numeric");
    }

    #[test]
    fn test_list_outside_between_uses_first_element() {
        let (sql, params) = render(FilterFn::NotEquals, json!([7, 9])).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" != $1::numeric");
        assert_eq!(params, vec![json!("7")]);

        let (sql, _) = render(FilterFn::Between, json!([1, 2, 3])).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" = $1::numeric");
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = render(FilterFn::Equals, json!("abc")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
        assert!(render(FilterFn::Equals, json!({"a": 1})).is_err());
    }

    // ==================== Ranges ====================

    #[test]
    fn test_between_upper_bound_only() {
        let (sql, params) = render(FilterFn::Between, json!([null, 100])).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" <= $1::numeric");
        assert_eq!(params, vec![json!("100")]);
    }

    #[test]
    fn test_between_lower_bound_only() {
        let (sql, _) = render(FilterFn::BetweenInclusive, json!(["10", " "])).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" >= $1::numeric");
    }

    #[test]
    fn test_between_no_bounds_is_true() {
        let (sql, params) = render(FilterFn::Between, json!([null, ""])).unwrap();
        assert_eq!(sql, "TRUE");
        assert!(params.is_empty());
    }

    #[test]
    fn test_between_exclusive_and_inclusive() {
        let (sql, _) = render(FilterFn::Between, json!([1, 5])).unwrap();
        assert_eq!(
            sql,
            "(\"tasks\".\"estimate\" > $1::numeric) AND (\"tasks\".\"estimate\" < $2::numeric)"
        );
        let (sql, _) = render(FilterFn::BetweenInclusive, json!([1, 5])).unwrap();
        assert_eq!(
            sql,
            "(\"tasks\".\"estimate\" >= $1::numeric) AND (\"tasks\".\"estimate\" <= $2::numeric)"
        );
    }

    #[test]
    fn test_null_equality_is_null_check() {
        let (sql, _) = render(FilterFn::Equals, json!([])).unwrap();
        assert_eq!(sql, "\"tasks\".\"estimate\" IS NULL");
        assert!(render(FilterFn::GreaterThan, Value::Null).is_err());
    }
}
