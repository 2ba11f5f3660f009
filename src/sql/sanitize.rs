//! SQL identifier sanitization
//!
//! Every table, alias and column name reaches SQL through `quote_identifier`.
//! Names coming from a data model are additionally checked with
//! `validate_identifier` when the model is registered.

use regex::Regex;

/// PostgreSQL reserved keywords that cannot be used as unquoted identifiers
pub const POSTGRES_RESERVED_WORDS: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC", "BOTH",
    "CASE", "CAST", "CHECK", "COLLATE", "COLUMN", "CONSTRAINT", "CREATE", "CURRENT_CATALOG",
    "CURRENT_DATE", "CURRENT_ROLE", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE",
    "FETCH", "FOR", "FOREIGN", "FROM", "GRANT", "GROUP", "HAVING", "IN", "INITIALLY",
    "INTERSECT", "INTO", "LATERAL", "LEADING", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NOT",
    "NULL", "OFFSET", "ON", "ONLY", "OR", "ORDER", "PLACING", "PRIMARY", "REFERENCES",
    "RETURNING", "SELECT", "SESSION_USER", "SOME", "SYMMETRIC", "TABLE", "THEN", "TO",
    "TRAILING", "TRUE", "UNION", "UNIQUE", "USER", "USING", "VARIADIC", "WHEN", "WHERE",
    "WINDOW", "WITH",
];

const IDENTIFIER_PATTERN: &str = r"^[a-z][a-z0-9_]*$";

/// Quote a SQL identifier, doubling any embedded double quotes
///
/// # Example
/// ```
/// use relgraph_store::sql::quote_identifier;
///
/// assert_eq!(quote_identifier("tasks"), "\"tasks\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Validate a table or column name
///
/// Rules:
/// - Must start with a lowercase letter
/// - Only lowercase letters, digits and underscores
/// - Not a PostgreSQL reserved word
/// - Not one of `reserved_columns`
///
/// # Example
/// ```
/// use relgraph_store::sql::validate_identifier;
///
/// assert!(validate_identifier("tasks", &[]).is_ok());
/// assert!(validate_identifier("order", &[]).is_err());
/// assert!(validate_identifier("deleted", &["deleted"]).is_err());
/// ```
pub fn validate_identifier(name: &str, reserved_columns: &[&str]) -> Result<(), String> {
    if name.is_empty() {
        return Err("Identifier cannot be empty".to_string());
    }

    let re = Regex::new(IDENTIFIER_PATTERN).map_err(|e| e.to_string())?;
    if !re.is_match(name) {
        return Err(format!(
            "Identifier '{}' is invalid. Must start with a lowercase letter and contain only lowercase letters, numbers, and underscores.",
            name
        ));
    }

    if POSTGRES_RESERVED_WORDS.contains(&name.to_uppercase().as_str()) {
        return Err(format!(
            "Identifier '{}' is a PostgreSQL reserved keyword and cannot be used.",
            name
        ));
    }

    if reserved_columns.contains(&name) {
        return Err(format!("Column name '{}' is reserved and cannot be used.", name));
    }

    Ok(())
}

/// Split a dotted path into its segments, rejecting empty segments
pub fn split_path(path: &str) -> Result<Vec<&str>, String> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.trim().is_empty()) {
        return Err(format!("Path '{}' contains an empty segment", path));
    }
    Ok(segments)
}
