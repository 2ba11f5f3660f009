//! Request normalization
//!
//! Turns a raw table request payload into a `TableRequest`: fills defaults,
//! accepts the legacy operator and key names still sent by older clients and
//! drops filters that carry no usable value.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, StoreError};
use crate::query::request::TableRequest;

/// Legacy key that forces fuzzy global search when present
const LEGACY_GLOBAL_FILTER_FN_KEY: &str = "globalFilterFn";

/// Normalizes raw table request payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestInterpreter;

impl RequestInterpreter {
    pub fn new() -> Self {
        Self
    }

    /// Parse and normalize a JSON request body. An empty body is an empty request.
    pub fn interpret(&self, body: &str) -> Result<TableRequest> {
        if body.trim().is_empty() {
            return Ok(TableRequest::default());
        }
        let value: Value = serde_json::from_str(body)?;
        self.interpret_value(value)
    }

    /// Normalize an already-parsed request payload
    pub fn interpret_value(&self, value: Value) -> Result<TableRequest> {
        let mut map = match value {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(StoreError::validation(format!(
                    "Table request must be an object, got {}",
                    other
                )));
            }
        };

        if matches!(map.get("globalFilter"), None | Some(Value::Null)) {
            map.insert("globalFilter".to_string(), Value::String(String::new()));
        }

        if map.remove(LEGACY_GLOBAL_FILTER_FN_KEY).is_some() {
            map.insert("globalfilterFns".to_string(), Value::String("fuzzy".to_string()));
        }

        if let Some(Value::Array(filters)) = map.get_mut("columnFilters") {
            let before = filters.len();
            filters.retain(|f| has_usable_value(f.get("value").unwrap_or(&Value::Null)));
            if filters.len() != before {
                debug!(
                    dropped = before - filters.len(),
                    "Dropped column filters without a usable value"
                );
            }
        }

        if let Some(Value::Object(fns)) = map.get_mut("columnFilterFns") {
            for op in fns.values_mut() {
                if op.as_str() == Some("equals2") {
                    *op = Value::String("equals".to_string());
                }
            }
        }

        for key in ["columnFilters", "sorting"] {
            if matches!(map.get(key), Some(Value::Null)) {
                map.remove(key);
            }
        }
        if matches!(map.get("columnFilterFns"), Some(Value::Null)) {
            map.remove("columnFilterFns");
        }

        match map.get("pagination") {
            Some(Value::Null) => {
                map.remove("pagination");
            }
            Some(pagination) => validate_pagination(pagination)?,
            None => {}
        }

        Ok(serde_json::from_value(Value::Object(map))?)
    }
}

/// Whether a filter value is worth compiling
fn has_usable_value(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(|item| match item {
            Value::Null => false,
            Value::String(s) => !s.trim().is_empty(),
            _ => true,
        }),
        _ => true,
    }
}

fn validate_pagination(pagination: &Value) -> Result<()> {
    let Some(obj) = pagination.as_object() else {
        return Err(StoreError::validation("pagination must be an object"));
    };
    if let Some(index) = obj.get("pageIndex") {
        match index.as_i64() {
            Some(i) if i >= 0 => {}
            _ => {
                return Err(StoreError::validation(format!(
                    "pageIndex must be a non-negative integer, got {}",
                    index
                )));
            }
        }
    }
    if let Some(size) = obj.get("pageSize") {
        match size.as_i64() {
            Some(s) if s > 0 => {}
            _ => {
                return Err(StoreError::validation(format!(
                    "pageSize must be a positive integer, got {}",
                    size
                )));
            }
        }
    }
    Ok(())
}
