use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::query::filters::{OperatorSet, ValueFilter};
use crate::query::request::FilterFn;
use crate::sql::condition::{ColumnRef, CompareOp, Condition};
use crate::types::{ColumnDefinition, SqlCast};

const BOOLEAN_OPERATORS: &[FilterFn] = &[FilterFn::Equals];

/// Boolean equality
#[derive(Debug, Default, Clone, Copy)]
pub struct BooleanFilter;

impl OperatorSet for BooleanFilter {
    fn operators(&self) -> &'static [FilterFn] {
        BOOLEAN_OPERATORS
    }
}

impl ValueFilter for BooleanFilter {
    fn apply(
        &self,
        column: &ColumnRef,
        definition: &ColumnDefinition,
        op: &FilterFn,
        value: &Value,
    ) -> Result<Condition> {
        if !self.supports(op) {
            return Err(StoreError::invalid_filter(format!(
                "Unsupported boolean operator: {}",
                op
            )));
        }
        let flag = match value {
            Value::Null => {
                return Ok(Condition::IsNull {
                    column: column.clone(),
                    negated: false,
                });
            }
            Value::Bool(b) => *b,
            Value::String(s) if s.eq_ignore_ascii_case("true") => true,
            Value::String(s) if s.eq_ignore_ascii_case("false") => false,
            other => {
                return Err(StoreError::invalid_filter(format!(
                    "'{}' expects a boolean, got {}",
                    definition.name, other
                )));
            }
        };
        Ok(Condition::compare(
            column.clone(),
            CompareOp::Eq,
            Value::Bool(flag),
            SqlCast::Boolean,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::condition::build_condition_clause;
    use crate::types::ColumnType;
    use serde_json::json;

    fn apply(op: FilterFn, value: Value) -> Result<Condition> {
        BooleanFilter.apply(
            &ColumnRef::new("tasks", "done"),
            &ColumnDefinition::new("done", ColumnType::Boolean),
            &op,
            &value,
        )
    }

    #[test]
    fn test_equals_accepts_bools_and_strings() {
        let mut offset = 1;
        let (sql, params) = build_condition_clause(&apply(FilterFn::Equals, json!(true)).unwrap(), &mut offset);
        assert_eq!(sql, "\"tasks\".\"done\" = $1::boolean");
        assert_eq!(params, vec![json!("true")]);

        assert_eq!(
            apply(FilterFn::Equals, json!("FALSE")).unwrap(),
            apply(FilterFn::Equals, json!(false)).unwrap()
        );
    }

    #[test]
    fn test_rejects_other_operators_and_values() {
        assert!(apply(FilterFn::NotEquals, json!(true)).is_err());
        assert!(apply(FilterFn::Equals, json!("maybe")).is_err());
        assert!(apply(FilterFn::Equals, json!(1)).is_err());
    }
}
