use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::query::filters::{
    compare_op, is_blank, null_aware_compare, range_condition, OperatorSet, ValueFilter,
};
use crate::query::request::FilterFn;
use crate::sql::condition::{ColumnRef, CompareOp, Condition};
use crate::types::{ColumnDefinition, SqlCast};

const DATE_OPERATORS: &[FilterFn] = &[
    FilterFn::Equals,
    FilterFn::NotEquals,
    FilterFn::LessThan,
    FilterFn::LessThanOrEqualTo,
    FilterFn::GreaterThan,
    FilterFn::GreaterThanOrEqualTo,
    FilterFn::Between,
    FilterFn::BetweenInclusive,
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Timestamp comparisons and ranges.
///
/// Accepts RFC 3339, naive date-time and date-only strings. A single value
/// that is not a string, or does not parse, is compared as text for equality.
#[derive(Debug, Default, Clone, Copy)]
pub struct DateFilter;

impl OperatorSet for DateFilter {
    fn operators(&self) -> &'static [FilterFn] {
        DATE_OPERATORS
    }
}

impl ValueFilter for DateFilter {
    fn apply(
        &self,
        column: &ColumnRef,
        definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition> {
        let op = if self.supports(op) { op } else { &FilterFn::Equals };

        if matches!(op, FilterFn::Between | FilterFn::BetweenInclusive) {
            return match value {
                Value::Array(items) if items.len() == 2 => Ok(range_condition(
                    column,
                    SqlCast::Timestamptz,
                    bound(&items[0])?,
                    bound(&items[1])?,
                    *op == FilterFn::BetweenInclusive,
                )),
                other => Ok(text_equality(column, other)),
            };
        }

        let Some(text) = value.as_str() else {
            return Ok(text_equality(column, value));
        };
        let Some(parsed) = parse_date(text) else {
            debug!(column = %definition.name, value = %text, "Unparsable date, comparing as text");
            return Ok(text_equality(column, value));
        };

        let cmp = compare_op(op).unwrap_or(CompareOp::Eq);
        null_aware_compare(column, cmp, Value::String(parsed), SqlCast::Timestamptz)
            .ok_or_else(|| StoreError::invalid_filter(format!("{} requires a date", op)))
    }
}

fn bound(value: &Value) -> Result<Option<Value>> {
    if is_blank(value) {
        return Ok(None);
    }
    value
        .as_str()
        .and_then(parse_date)
        .map(|d| Some(Value::String(d)))
        .ok_or_else(|| StoreError::invalid_filter(format!("{} is not a date", value)))
}

fn text_equality(column: &ColumnRef, value: &Value) -> Condition {
    null_aware_compare(column, CompareOp::Eq, value.clone(), SqlCast::Text)
        .unwrap_or(Condition::False)
}

/// Parse a date string to the text PostgreSQL reads as a timestamp
pub(crate) fn parse_date(text: &str) -> Option<String> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.to_rfc3339());
    }
    for format in NAIVE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.format("%Y-%m-%d").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::condition::build_condition_clause;
    use crate::types::ColumnType;
    use serde_json::json;

    fn render(op: FilterFn, value: Value) -> Result<(String, Vec<Value>)> {
        let column = ColumnRef::new("tasks", "due");
        let definition = ColumnDefinition::new("due", ColumnType::Timestamp);
        let condition = DateFilter.apply(&column, &definition, &op, &value)?;
        let mut offset = 1;
        Ok(build_condition_clause(&condition, &mut offset))
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-03-01T10:00:00Z").unwrap(),
            "2024-03-01T10:00:00+00:00"
        );
        assert_eq!(
            parse_date("2024-03-01 10:00:00").unwrap(),
            "2024-03-01T10:00:00"
        );
        assert_eq!(parse_date("2024-03-01").unwrap(), "2024-03-01");
        assert!(parse_date("yesterday").is_none());
    }

    #[test]
    fn test_single_date_comparison() {
        let (sql, params) = render(FilterFn::GreaterThan, json!("2024-03-01")).unwrap();
        assert_eq!(sql, "\"tasks\".\"due\" > $1::timestamptz");
        assert_eq!(params, vec![json!("2024-03-01")]);
    }

    #[test]
    fn test_unparsable_date_falls_back_to_text_equality() {
        let (sql, params) = render(FilterFn::LessThan, json!("soon")).unwrap();
        assert_eq!(sql, "\"tasks\".\"due\"::text = $1::text");
        assert_eq!(params, vec![json!("soon")]);

        let (sql, _) = render(FilterFn::Equals, json!(20240301)).unwrap();
        assert_eq!(sql, "\"tasks\".\"due\"::text = $1::text");
    }

    #[test]
    fn test_date_between() {
        let (sql, _) = render(FilterFn::Between, json!(["2024-01-01", null])).unwrap();
        assert_eq!(sql, "\"tasks\".\"due\" >= $1::timestamptz");

        let (sql, params) =
            render(FilterFn::BetweenInclusive, json!(["2024-01-01", "2024-01-31"])).unwrap();
        assert_eq!(
            sql,
            "(\"tasks\".\"due\" >= $1::timestamptz) AND (\"tasks\".\"due\" <= $2::timestamptz)"
        );
        assert_eq!(params.len(), 2);

        let (sql, _) = render(FilterFn::Between, json!(["", null])).unwrap();
        assert_eq!(sql, "TRUE");
    }

    #[test]
    fn test_between_with_bad_bound_is_rejected() {
        let err = render(FilterFn::Between, json!(["someday", null])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter(_)));
    }
}
