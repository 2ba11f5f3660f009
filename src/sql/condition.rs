//! Condition building for SQL WHERE clauses
//!
//! Filters produce a typed `Condition` tree; `build_condition_clause` renders
//! it to PostgreSQL text with `$n` placeholders and the parameter values to
//! bind, in placeholder order.

use serde_json::Value;

use crate::sql::sanitize::quote_identifier;
use crate::types::SqlCast;

/// A column qualified by the alias of the table it is read from
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(qualifier: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            column: column.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        format!(
            "{}.{}",
            quote_identifier(&self.qualifier),
            quote_identifier(&self.column)
        )
    }
}

/// Binary comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
        }
    }

    /// The operator whose result is the logical negation of this one
    pub fn negate(&self) -> Self {
        match self {
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
            CompareOp::Lt => CompareOp::Gte,
            CompareOp::Lte => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Lte,
            CompareOp::Gte => CompareOp::Lt,
        }
    }
}

/// An aliased table in a FROM or JOIN clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub table: String,
    pub alias: String,
}

impl TableRef {
    pub fn new(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            alias: alias.into(),
        }
    }

    pub fn to_sql(&self) -> String {
        if self.table == self.alias {
            quote_identifier(&self.table)
        } else {
            format!(
                "{} AS {}",
                quote_identifier(&self.table),
                quote_identifier(&self.alias)
            )
        }
    }
}

/// An inner join on a single column equality
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub target: TableRef,
    pub left: ColumnRef,
    pub right: ColumnRef,
}

impl Join {
    pub fn to_sql(&self) -> String {
        format!(
            "INNER JOIN {} ON {} = {}",
            self.target.to_sql(),
            self.left.to_sql(),
            self.right.to_sql()
        )
    }
}

/// A correlated subquery used by EXISTS
#[derive(Debug, Clone, PartialEq)]
pub struct Subquery {
    pub from: TableRef,
    pub joins: Vec<Join>,
    pub filter: Condition,
}

/// Boolean predicate tree
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    True,
    False,
    /// `column op $n::cast`; text comparisons also cast the column
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
        cast: SqlCast,
    },
    /// `column::text [I]LIKE $n`
    Like {
        column: ColumnRef,
        pattern: String,
        case_insensitive: bool,
        negated: bool,
    },
    /// Membership in a JSON array parameter; elements are cast like the column
    InList {
        column: ColumnRef,
        values: Vec<Value>,
        cast: SqlCast,
        negated: bool,
    },
    IsNull {
        column: ColumnRef,
        negated: bool,
    },
    ColumnsEqual(ColumnRef, ColumnRef),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    Exists(Box<Subquery>),
}

impl Condition {
    pub fn compare(column: ColumnRef, op: CompareOp, value: Value, cast: SqlCast) -> Self {
        Condition::Compare {
            column,
            op,
            value,
            cast,
        }
    }

    pub fn ilike(column: ColumnRef, pattern: impl Into<String>) -> Self {
        Condition::Like {
            column,
            pattern: pattern.into(),
            case_insensitive: true,
            negated: false,
        }
    }

    pub fn not_ilike(column: ColumnRef, pattern: impl Into<String>) -> Self {
        Condition::Like {
            column,
            pattern: pattern.into(),
            case_insensitive: true,
            negated: true,
        }
    }

    pub fn in_list(column: ColumnRef, values: Vec<Value>, cast: SqlCast) -> Self {
        Condition::InList {
            column,
            values,
            cast,
            negated: false,
        }
    }

    pub fn not_in_list(column: ColumnRef, values: Vec<Value>, cast: SqlCast) -> Self {
        Condition::InList {
            column,
            values,
            cast,
            negated: true,
        }
    }

    /// AND of `conditions`, flattening the trivial cases
    pub fn all(mut conditions: Vec<Condition>) -> Self {
        conditions.retain(|c| *c != Condition::True);
        match conditions.len() {
            0 => Condition::True,
            1 => conditions.remove(0),
            _ => Condition::And(conditions),
        }
    }

    /// OR of `conditions`, flattening the trivial cases
    pub fn any(mut conditions: Vec<Condition>) -> Self {
        conditions.retain(|c| *c != Condition::False);
        match conditions.len() {
            0 => Condition::False,
            1 => conditions.remove(0),
            _ => Condition::Or(conditions),
        }
    }

    pub fn negate(self) -> Self {
        match self {
            Condition::True => Condition::False,
            Condition::False => Condition::True,
            Condition::Not(inner) => *inner,
            other => Condition::Not(Box::new(other)),
        }
    }

    pub fn exists(subquery: Subquery) -> Self {
        Condition::Exists(Box::new(subquery))
    }
}

/// Build SQL WHERE clause from a `Condition`
///
/// Returns (clause, params) where:
/// - `clause` is the SQL condition with parameter placeholders ($1, $2, etc.)
/// - `params` are the values to bind, in placeholder order
///
/// `param_offset` is the next placeholder number and is advanced past every
/// placeholder emitted.
pub fn build_condition_clause(condition: &Condition, param_offset: &mut i32) -> (String, Vec<Value>) {
    let mut params = Vec::new();
    let clause = render(condition, param_offset, &mut params);
    (clause, params)
}

fn render(condition: &Condition, param_offset: &mut i32, params: &mut Vec<Value>) -> String {
    match condition {
        Condition::True => "TRUE".to_string(),
        Condition::False => "FALSE".to_string(),
        Condition::Compare {
            column,
            op,
            value,
            cast,
        } => {
            let lhs = match cast {
                SqlCast::Text => format!("{}::text", column.to_sql()),
                _ => column.to_sql(),
            };
            params.push(Value::String(json_value_to_string(value)));
            let clause = format!(
                "{} {} ${}::{}",
                lhs,
                op.as_sql(),
                param_offset,
                cast.as_sql()
            );
            *param_offset += 1;
            clause
        }
        Condition::Like {
            column,
            pattern,
            case_insensitive,
            negated,
        } => {
            params.push(Value::String(pattern.clone()));
            let like = if *case_insensitive { "ILIKE" } else { "LIKE" };
            let clause = format!("{}::text {} ${}", column.to_sql(), like, param_offset);
            *param_offset += 1;
            if *negated {
                format!("NOT ({})", clause)
            } else {
                clause
            }
        }
        Condition::InList {
            column,
            values,
            cast,
            negated,
        } => {
            let elements = values
                .iter()
                .map(|v| Value::String(json_value_to_string(v)))
                .collect();
            params.push(Value::Array(elements));
            let clause = match cast {
                SqlCast::Text => format!(
                    "{}::text = ANY(SELECT jsonb_array_elements_text(${}::jsonb))",
                    column.to_sql(),
                    param_offset
                ),
                _ => format!(
                    "{} = ANY(SELECT e::{} FROM jsonb_array_elements_text(${}::jsonb) AS e)",
                    column.to_sql(),
                    cast.as_sql(),
                    param_offset
                ),
            };
            *param_offset += 1;
            if *negated {
                format!("NOT ({})", clause)
            } else {
                clause
            }
        }
        Condition::IsNull { column, negated } => {
            if *negated {
                format!("{} IS NOT NULL", column.to_sql())
            } else {
                format!("{} IS NULL", column.to_sql())
            }
        }
        Condition::ColumnsEqual(left, right) => format!("{} = {}", left.to_sql(), right.to_sql()),
        Condition::And(items) => join_group(items, " AND ", "TRUE", param_offset, params),
        Condition::Or(items) => join_group(items, " OR ", "FALSE", param_offset, params),
        Condition::Not(inner) => format!("NOT ({})", render(inner, param_offset, params)),
        Condition::Exists(sub) => {
            let mut sql = format!("EXISTS (SELECT 1 FROM {}", sub.from.to_sql());
            for join in &sub.joins {
                sql.push(' ');
                sql.push_str(&join.to_sql());
            }
            sql.push_str(" WHERE ");
            sql.push_str(&render(&sub.filter, param_offset, params));
            sql.push(')');
            sql
        }
    }
}

fn join_group(
    items: &[Condition],
    separator: &str,
    empty: &str,
    param_offset: &mut i32,
    params: &mut Vec<Value>,
) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items
        .iter()
        .map(|c| format!("({})", render(c, param_offset, params)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// Convert JSON value to string for SQL comparison
pub(crate) fn json_value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => value.to_string(),
    }
}

/// One ORDER BY key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: ColumnRef,
    pub descending: bool,
}

/// Build ORDER BY clause (without the "ORDER BY" prefix) preserving key order
pub fn build_order_by_clause(terms: &[OrderTerm]) -> String {
    terms
        .iter()
        .map(|t| {
            format!(
                "{} {}",
                t.column.to_sql(),
                if t.descending { "DESC" } else { "ASC" }
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn col(name: &str) -> ColumnRef {
        ColumnRef::new("tasks", name)
    }

    // ==================== Comparison Operations ====================

    #[test]
    fn test_text_compare_casts_column() {
        let c = Condition::compare(col("status"), CompareOp::Eq, json!("OPEN"), SqlCast::Text);

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&c, &mut offset);

        assert_eq!(clause, "\"tasks\".\"status\"::text = $1::text");
        assert_eq!(params, vec![json!("OPEN")]);
        assert_eq!(offset, 2);
    }

    #[test]
    fn test_numeric_compare_binds_string() {
        let c = Condition::compare(col("estimate"), CompareOp::Lte, json!(100), SqlCast::Numeric);

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&c, &mut offset);

        assert_eq!(clause, "\"tasks\".\"estimate\" <= $1::numeric");
        assert_eq!(params[0], json!("100"));
    }

    #[test]
    fn test_compare_op_negation_is_involutive() {
        for op in [
            CompareOp::Eq,
            CompareOp::Ne,
            CompareOp::Lt,
            CompareOp::Lte,
            CompareOp::Gt,
            CompareOp::Gte,
        ] {
            assert_eq!(op.negate().negate(), op);
        }
        assert_eq!(CompareOp::Gt.negate(), CompareOp::Lte);
    }

    // ==================== Pattern and Membership ====================

    #[test]
    fn test_ilike_and_negated_ilike() {
        let mut offset = 1;
        let (clause, params) =
            build_condition_clause(&Condition::ilike(col("title"), "%bug%"), &mut offset);
        assert_eq!(clause, "\"tasks\".\"title\"::text ILIKE $1");
        assert_eq!(params, vec![json!("%bug%")]);

        let (clause, _) =
            build_condition_clause(&Condition::not_ilike(col("title"), "%bug%"), &mut offset);
        assert_eq!(clause, "NOT (\"tasks\".\"title\"::text ILIKE $2)");
    }

    #[test]
    fn test_in_list_binds_json_array_of_strings() {
        let c = Condition::in_list(col("priority"), vec![json!(1), json!("2")], SqlCast::Text);

        let mut offset = 3;
        let (clause, params) = build_condition_clause(&c, &mut offset);

        assert_eq!(
            clause,
            "\"tasks\".\"priority\"::text = ANY(SELECT jsonb_array_elements_text($3::jsonb))"
        );
        assert_eq!(params, vec![json!(["1", "2"])]);
        assert_eq!(offset, 4);
    }

    #[test]
    fn test_in_list_casts_elements_for_typed_columns() {
        let c = Condition::in_list(col("estimate"), vec![json!(1.5), json!("2")], SqlCast::Numeric);
        let mut offset = 1;
        let (clause, params) = build_condition_clause(&c, &mut offset);
        assert_eq!(
            clause,
            "\"tasks\".\"estimate\" = ANY(SELECT e::numeric FROM jsonb_array_elements_text($1::jsonb) AS e)"
        );
        assert_eq!(params, vec![json!(["1.5", "2"])]);

        let c = Condition::not_in_list(
            col("due"),
            vec![json!("2024-01-01T00:00:00Z")],
            SqlCast::Timestamptz,
        );
        let (clause, _) = build_condition_clause(&c, &mut offset);
        assert_eq!(
            clause,
            "NOT (\"tasks\".\"due\" = ANY(SELECT e::timestamptz FROM jsonb_array_elements_text($2::jsonb) AS e))"
        );
    }

    // ==================== Logical Operations ====================

    #[test]
    fn test_and_or_nesting_and_offsets() {
        let c = Condition::all(vec![
            Condition::compare(col("a"), CompareOp::Eq, json!("1"), SqlCast::Text),
            Condition::any(vec![
                Condition::compare(col("b"), CompareOp::Eq, json!("2"), SqlCast::Text),
                Condition::compare(col("c"), CompareOp::Eq, json!("3"), SqlCast::Text),
            ]),
        ]);

        let mut offset = 5;
        let (clause, params) = build_condition_clause(&c, &mut offset);

        assert_eq!(
            clause,
            "(\"tasks\".\"a\"::text = $5::text) AND ((\"tasks\".\"b\"::text = $6::text) OR (\"tasks\".\"c\"::text = $7::text))"
        );
        assert_eq!(params.len(), 3);
        assert_eq!(offset, 8);
    }

    #[test]
    fn test_all_and_any_flatten_trivial_cases() {
        assert_eq!(Condition::all(vec![]), Condition::True);
        assert_eq!(Condition::any(vec![]), Condition::False);
        assert_eq!(
            Condition::all(vec![Condition::True, Condition::False]),
            Condition::False
        );
        assert_eq!(Condition::True.negate(), Condition::False);
    }

    #[test]
    fn test_double_negation_collapses() {
        let inner = Condition::IsNull {
            column: col("due"),
            negated: false,
        };
        assert_eq!(inner.clone().negate().negate(), inner);
    }

    // ==================== Subqueries ====================

    #[test]
    fn test_exists_subquery() {
        let sub = Subquery {
            from: TableRef::new("comments", "sub_0"),
            joins: vec![Join {
                target: TableRef::new("users", "sub_1"),
                left: ColumnRef::new("sub_0", "author_id"),
                right: ColumnRef::new("sub_1", "id"),
            }],
            filter: Condition::all(vec![
                Condition::ColumnsEqual(ColumnRef::new("sub_0", "task_id"), col("id")),
                Condition::compare(
                    ColumnRef::new("sub_1", "name"),
                    CompareOp::Eq,
                    json!("ann"),
                    SqlCast::Text,
                ),
            ]),
        };

        let mut offset = 1;
        let (clause, params) = build_condition_clause(&Condition::exists(sub), &mut offset);

        assert_eq!(
            clause,
            "EXISTS (SELECT 1 FROM \"comments\" AS \"sub_0\" INNER JOIN \"users\" AS \"sub_1\" ON \"sub_0\".\"author_id\" = \"sub_1\".\"id\" WHERE (\"sub_0\".\"task_id\" = \"tasks\".\"id\") AND (\"sub_1\".\"name\"::text = $1::text))"
        );
        assert_eq!(params, vec![json!("ann")]);
    }

    // ==================== ORDER BY ====================

    #[test]
    fn test_order_by_preserves_key_order() {
        let terms = vec![
            OrderTerm {
                column: col("priority"),
                descending: true,
            },
            OrderTerm {
                column: ColumnRef::new("alias_0", "name"),
                descending: false,
            },
        ];
        assert_eq!(
            build_order_by_clause(&terms),
            "\"tasks\".\"priority\" DESC, \"alias_0\".\"name\" ASC"
        );
    }

    #[test]
    fn test_table_ref_without_alias() {
        assert_eq!(TableRef::new("tasks", "tasks").to_sql(), "\"tasks\"");
        assert_eq!(
            TableRef::new("tasks", "alias_2").to_sql(),
            "\"tasks\" AS \"alias_2\""
        );
    }
}
