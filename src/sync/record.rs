use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// A flat structured record: a shape name plus its field values.
///
/// Records are what the comparator works on. Two records can only be
/// compared when they carry the same shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    shape: String,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(shape: impl Into<String>) -> Self {
        Self {
            shape: shape.into(),
            fields: BTreeMap::new(),
        }
    }

    pub fn from_fields(shape: impl Into<String>, fields: BTreeMap<String, Value>) -> Self {
        Self {
            shape: shape.into(),
            fields,
        }
    }

    /// Add a field (builder form)
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn shape(&self) -> &str {
        &self.shape
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn into_fields(self) -> BTreeMap<String, Value> {
        self.fields
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.shape)?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_display() {
        let r = Record::new("Comment").field("id", 1).field("body", "hi");
        assert_eq!(r.to_string(), "Comment(body=\"hi\", id=1)");
        assert_eq!(r.get("id"), Some(&json!(1)));
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["body", "id"]);
    }
}
