//! Attribute type definitions
//!
//! `ColumnType` is the storage type of an attribute. Filters and the global
//! search only care about its coarser `SemanticType`.

use serde::{Deserialize, Serialize};

/// Storage type of an entity attribute
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ColumnType {
    /// Unlimited text (TEXT)
    String,

    /// 64-bit integer (BIGINT)
    Integer,

    /// Fixed precision number (NUMERIC)
    Decimal {
        #[serde(default = "default_precision")]
        precision: u8,
        #[serde(default = "default_scale")]
        scale: u8,
    },

    /// BOOLEAN
    Boolean,

    /// UTC timestamp (TIMESTAMP WITH TIME ZONE)
    Timestamp,

    /// Binary JSON (JSONB)
    Json,

    /// Text restricted to a fixed set of values
    Enum { values: Vec<String> },
}

fn default_precision() -> u8 {
    19
}

fn default_scale() -> u8 {
    4
}

/// Coarse attribute category used for operator dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Text,
    Number,
    Date,
    Boolean,
    /// Structured JSON; only list and text operators apply
    Json,
}

/// Cast appended to a bound parameter so PostgreSQL compares typed values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlCast {
    Text,
    Numeric,
    Timestamptz,
    Boolean,
}

impl SqlCast {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlCast::Text => "text",
            SqlCast::Numeric => "numeric",
            SqlCast::Timestamptz => "timestamptz",
            SqlCast::Boolean => "boolean",
        }
    }
}

impl ColumnType {
    /// Create a Decimal type with specified precision and scale
    pub fn decimal(precision: u8, scale: u8) -> Self {
        ColumnType::Decimal { precision, scale }
    }

    pub fn semantic_type(&self) -> SemanticType {
        match self {
            ColumnType::String | ColumnType::Enum { .. } => SemanticType::Text,
            ColumnType::Integer | ColumnType::Decimal { .. } => SemanticType::Number,
            ColumnType::Timestamp => SemanticType::Date,
            ColumnType::Boolean => SemanticType::Boolean,
            ColumnType::Json => SemanticType::Json,
        }
    }

    /// Parameter cast for comparisons against this column
    pub fn sql_cast(&self) -> SqlCast {
        match self.semantic_type() {
            SemanticType::Number => SqlCast::Numeric,
            SemanticType::Date => SqlCast::Timestamptz,
            SemanticType::Boolean => SqlCast::Boolean,
            SemanticType::Text | SemanticType::Json => SqlCast::Text,
        }
    }

    /// Convert column type to PostgreSQL type string
    pub fn to_sql_type(&self, column_name: &str) -> String {
        match self {
            ColumnType::String => "TEXT".to_string(),
            ColumnType::Integer => "BIGINT".to_string(),
            ColumnType::Decimal { precision, scale } => {
                format!("NUMERIC({},{})", precision, scale)
            }
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Timestamp => "TIMESTAMP WITH TIME ZONE".to_string(),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::Enum { values } => format!(
                "TEXT CHECK ({} IN ({}))",
                crate::sql::sanitize::quote_identifier(column_name),
                values
                    .iter()
                    .map(|v| format!("'{}'", v.replace('\'', "''")))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }

    /// Validate that a JSON value is compatible with this column type.
    ///
    /// Null is always accepted; nullability is a property of the column.
    pub fn validate_value(&self, value: &serde_json::Value) -> Result<(), String> {
        use serde_json::Value;

        if value.is_null() {
            return Ok(());
        }

        match (self, value) {
            (ColumnType::String, Value::String(_)) => Ok(()),
            (ColumnType::Integer, Value::Number(n)) if n.is_i64() || n.is_u64() => Ok(()),
            (ColumnType::Integer, Value::String(s)) => s
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to integer", s)),
            (ColumnType::Decimal { .. }, Value::Number(_)) => Ok(()),
            (ColumnType::Decimal { .. }, Value::String(s)) => s
                .parse::<f64>()
                .map(|_| ())
                .map_err(|_| format!("Cannot convert '{}' to decimal", s)),
            (ColumnType::Boolean, Value::Bool(_)) => Ok(()),
            (ColumnType::Boolean, Value::String(s)) => match s.to_lowercase().as_str() {
                "true" | "false" | "1" | "0" | "yes" | "no" => Ok(()),
                _ => Err(format!("Cannot convert '{}' to boolean", s)),
            },
            (ColumnType::Timestamp, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
                .map(|_| ())
                .map_err(|e| format!("Invalid timestamp format: {}", e)),
            (ColumnType::Json, _) => Ok(()),
            (ColumnType::Enum { values }, Value::String(s)) => {
                if values.contains(s) {
                    Ok(())
                } else {
                    Err(format!("Value '{}' not in enum values: {:?}", s, values))
                }
            }
            _ => Err(format!("Type mismatch: expected {:?}, got {}", self, value)),
        }
    }
}

fn default_nullable() -> bool {
    true
}

/// A typed attribute of an entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnDefinition {
    /// Column name (valid PostgreSQL identifier)
    pub name: String,

    #[serde(flatten)]
    pub column_type: ColumnType,

    #[serde(default = "default_nullable")]
    pub nullable: bool,

    #[serde(default)]
    pub unique: bool,

    /// Default value as an SQL expression, e.g. "0", "NOW()", "'active'"
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "default")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            unique: false,
            default_value: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn semantic_type(&self) -> SemanticType {
        self.column_type.semantic_type()
    }

    /// Validate `value` against the type and the nullable flag
    pub fn validate(&self, value: &serde_json::Value) -> Result<(), String> {
        if value.is_null() && !self.nullable {
            return Err(format!("Column '{}' cannot be null", self.name));
        }
        self.column_type
            .validate_value(value)
            .map_err(|e| format!("Column '{}': {}", self.name, e))
    }
}
