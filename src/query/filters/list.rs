use serde_json::Value;

use crate::error::Result;
use crate::query::filters::{OperatorSet, ValueFilter};
use crate::query::request::FilterFn;
use crate::sql::condition::{ColumnRef, CompareOp, Condition};
use crate::types::ColumnDefinition;

const LIST_OPERATORS: &[FilterFn] = &[
    FilterFn::In,
    FilterFn::NotIn,
    FilterFn::Between,
    FilterFn::ArrIncludes,
    FilterFn::ArrIncludesSome,
    FilterFn::ArrIncludesAll,
];

/// Membership against a list of values.
///
/// Empty strings are dropped from the list and a scalar is a one-element
/// list. List elements are cast to the column's type before comparing.
/// `between` with two values is an inclusive range. The `arrIncludes*`
/// operators test scalar columns, so they are plain membership.
#[derive(Debug, Default, Clone, Copy)]
pub struct ListFilter;

impl OperatorSet for ListFilter {
    fn operators(&self) -> &'static [FilterFn] {
        LIST_OPERATORS
    }
}

impl ValueFilter for ListFilter {
    fn apply(
        &self,
        column: &ColumnRef,
        definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition> {
        let values = values_of(value);
        let cast = definition.column_type.sql_cast();
        let condition = match op {
            FilterFn::NotIn => Condition::not_in_list(column.clone(), values, cast),
            FilterFn::Between if values.len() == 2 => {
                Condition::all(vec![
                    Condition::compare(column.clone(), CompareOp::Gte, values[0].clone(), cast),
                    Condition::compare(column.clone(), CompareOp::Lte, values[1].clone(), cast),
                ])
            }
            _ => Condition::in_list(column.clone(), values, cast),
        };
        Ok(condition)
    }
}

fn values_of(value: &Value) -> Vec<Value> {
    let is_empty_string = |v: &Value| v.as_str() == Some("");
    match value {
        Value::Array(items) => items.iter().filter(|v| !is_empty_string(v)).cloned().collect(),
        Value::Null => Vec::new(),
        scalar if is_empty_string(scalar) => Vec::new(),
        scalar => vec![scalar.clone()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::condition::build_condition_clause;
    use crate::types::ColumnType;
    use serde_json::json;

    fn render(op: FilterFn, value: Value) -> (String, Vec<Value>) {
        render_on(ColumnDefinition::new("status", ColumnType::String), op, value)
    }

    fn render_on(definition: ColumnDefinition, op: FilterFn, value: Value) -> (String, Vec<Value>) {
        let column = ColumnRef::new("tasks", definition.name.as_str());
        let condition = ListFilter.apply(&column, &definition, &op, &value).unwrap();
        let mut offset = 1;
        build_condition_clause(&condition, &mut offset)
    }

    #[test]
    fn test_in_strips_empty_strings() {
        let (sql, params) = render(FilterFn::In, json!(["OPEN", "", "DONE"]));
        assert_eq!(
            sql,
            "\"tasks\".\"status\"::text = ANY(SELECT jsonb_array_elements_text($1::jsonb))"
        );
        assert_eq!(params, vec![json!(["OPEN", "DONE"])]);
    }

    #[test]
    fn test_in_on_number_column_compares_numerically() {
        let definition = ColumnDefinition::new("amount", ColumnType::decimal(19, 4));
        let (sql, params) = render_on(definition, FilterFn::In, json!([1.5, "2"]));
        assert_eq!(
            sql,
            "\"tasks\".\"amount\" = ANY(SELECT e::numeric FROM jsonb_array_elements_text($1::jsonb) AS e)"
        );
        assert_eq!(params, vec![json!(["1.5", "2"])]);
    }

    #[test]
    fn test_not_in_on_date_column_casts_elements() {
        let definition = ColumnDefinition::new("due", ColumnType::Timestamp);
        let (sql, _) = render_on(definition, FilterFn::NotIn, json!(["2024-03-01T00:00:00Z"]));
        assert!(sql.contains("e::timestamptz FROM jsonb_array_elements_text($1::jsonb)"));
        assert!(sql.starts_with("NOT (\"tasks\".\"due\" = ANY("));
    }

    #[test]
    fn test_not_in() {
        let (sql, _) = render(FilterFn::NotIn, json!(["OPEN"]));
        assert!(sql.starts_with("NOT ("));
    }

    #[test]
    fn test_scalar_is_one_element_list() {
        let (_, params) = render(FilterFn::In, json!("OPEN"));
        assert_eq!(params, vec![json!(["OPEN"])]);
    }

    #[test]
    fn test_between_is_inclusive() {
        let (sql, params) = render(FilterFn::Between, json!(["A", "M"]));
        assert_eq!(
            sql,
            "(\"tasks\".\"status\"::text >= $1::text) AND (\"tasks\".\"status\"::text <= $2::text)"
        );
        assert_eq!(params, vec![json!("A"), json!("M")]);
    }

    #[test]
    fn test_array_operators_are_membership() {
        let expected = render(FilterFn::In, json!(["a", "b"]));
        for op in [
            FilterFn::ArrIncludes,
            FilterFn::ArrIncludesSome,
            FilterFn::ArrIncludesAll,
        ] {
            assert_eq!(render(op, json!(["a", "b"])), expected);
        }
    }
}
