//! Structural comparison of two record lists
//!
//! `Comparator::new` classifies every record of an old and a new list as
//! added, removed, modified or unchanged. The result is computed once, at
//! construction, and is read-only afterwards.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::debug;

use crate::config::RelationConfig;
use crate::error::{Result, StoreError};
use crate::sync::record::Record;

/// Key and exclusion settings for a comparison
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareOptions {
    /// Fields identifying the same logical item. Empty means every non-excluded field.
    pub key_fields: BTreeSet<String>,
    /// Fields ignored when deciding whether a matched item changed
    pub exclude_fields: BTreeSet<String>,
}

impl CompareOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn exclude_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&RelationConfig> for CompareOptions {
    fn from(config: &RelationConfig) -> Self {
        Self {
            key_fields: config.key_fields.clone(),
            exclude_fields: config.exclude_fields.clone(),
        }
    }
}

/// Old and new value of one changed field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// A matched pair whose non-excluded fields differ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModifiedItem {
    pub key: BTreeMap<String, Value>,
    pub old: Record,
    pub new: Record,
    pub changed_fields: BTreeMap<String, FieldChange>,
}

/// Classification of an old and a new record list
#[derive(Debug, Clone)]
pub struct Comparator {
    key_fields: BTreeSet<String>,
    total_old: usize,
    total_new: usize,
    added: Vec<Record>,
    removed: Vec<Record>,
    modified: Vec<ModifiedItem>,
    unchanged: Vec<Record>,
}

impl Comparator {
    /// Compare `old` against `new`.
    ///
    /// Fails with `ModelComparison` when records within a list, or across
    /// the two lists, have different shapes, when a key field is missing
    /// from a record, or when two records of one list share a key.
    pub fn new(old: Vec<Record>, new: Vec<Record>, options: CompareOptions) -> Result<Self> {
        let old_shape = common_shape(&old, "old")?;
        let new_shape = common_shape(&new, "new")?;
        if let (Some(o), Some(n)) = (old_shape, new_shape) {
            if o != n {
                return Err(StoreError::model_comparison(format!(
                    "old list holds {} records but new list holds {} records",
                    o, n
                )));
            }
        }

        let key_fields = effective_key(&old, &new, &options);
        if key_fields.is_empty() && !(old.is_empty() && new.is_empty()) {
            return Err(StoreError::model_comparison(
                "no fields left to identify records: every field is excluded",
            ));
        }

        let old_keys = keys_of(&old, "old", &key_fields)?;
        let new_keys = keys_of(&new, "new", &key_fields)?;
        let old_index: HashMap<&str, usize> = old_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.as_str(), i))
            .collect();
        let new_index: HashMap<&str, usize> = new_keys
            .iter()
            .enumerate()
            .map(|(i, k)| (k.as_str(), i))
            .collect();

        let added = new_keys
            .iter()
            .zip(&new)
            .filter(|(k, _)| !old_index.contains_key(k.as_str()))
            .map(|(_, r)| r.clone())
            .collect::<Vec<_>>();

        let mut removed = Vec::new();
        let mut modified = Vec::new();
        let mut unchanged = Vec::new();
        for (key, old_record) in old_keys.iter().zip(&old) {
            let Some(&j) = new_index.get(key.as_str()) else {
                removed.push(old_record.clone());
                continue;
            };
            let new_record = &new[j];
            let changed_fields = diff_fields(old_record, new_record, &options.exclude_fields);
            if changed_fields.is_empty() {
                unchanged.push(old_record.clone());
            } else {
                modified.push(ModifiedItem {
                    key: key_fields
                        .iter()
                        .map(|f| {
                            let v = old_record.get(f).cloned().unwrap_or(Value::Null);
                            (f.clone(), v)
                        })
                        .collect(),
                    old: old_record.clone(),
                    new: new_record.clone(),
                    changed_fields,
                });
            }
        }

        debug!(
            added = added.len(),
            removed = removed.len(),
            modified = modified.len(),
            unchanged = unchanged.len(),
            "Compared record lists"
        );

        Ok(Self {
            key_fields,
            total_old: old.len(),
            total_new: new.len(),
            added,
            removed,
            modified,
            unchanged,
        })
    }

    /// New-side records with no old counterpart, in new-list order
    pub fn added(&self) -> &[Record] {
        &self.added
    }

    /// Old-side records with no new counterpart, in old-list order
    pub fn removed(&self) -> &[Record] {
        &self.removed
    }

    pub fn modified(&self) -> &[ModifiedItem] {
        &self.modified
    }

    pub fn unchanged(&self) -> &[Record] {
        &self.unchanged
    }

    /// Fields used to match records across the lists
    pub fn key_fields(&self) -> &BTreeSet<String> {
        &self.key_fields
    }

    pub fn has_changes(&self) -> bool {
        !(self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty())
    }

    pub fn total_items_old(&self) -> usize {
        self.total_old
    }

    pub fn total_items_new(&self) -> usize {
        self.total_new
    }

    /// Human-readable summary under a `=== title ===` header
    pub fn pretty(&self, title: &str) -> String {
        let mut lines = vec![
            format!("=== {} ===", title),
            format!("Added: {} items", self.added.len()),
            format!("Removed: {} items", self.removed.len()),
            format!("Modified: {} items", self.modified.len()),
            format!("Unchanged: {} items", self.unchanged.len()),
        ];

        if !self.added.is_empty() {
            lines.push(String::new());
            lines.push("[ADDED ITEMS]".to_string());
            lines.extend(self.added.iter().map(|r| format!("  + {}", r)));
        }
        if !self.removed.is_empty() {
            lines.push(String::new());
            lines.push("[REMOVED ITEMS]".to_string());
            lines.extend(self.removed.iter().map(|r| format!("  - {}", r)));
        }
        if !self.modified.is_empty() {
            lines.push(String::new());
            lines.push("[MODIFIED ITEMS]".to_string());
            for item in &self.modified {
                let key = serde_json::to_string(&item.key).unwrap_or_default();
                lines.push(format!("  Modified item with key {}:", key));
                for (field, change) in &item.changed_fields {
                    lines.push(format!("    {}: {} -> {}", field, change.old, change.new));
                }
            }
        }
        if !self.unchanged.is_empty() {
            lines.push(String::new());
            lines.push(format!("[UNCHANGED ITEMS] ({} items)", self.unchanged.len()));
            lines.extend(self.unchanged.iter().take(3).map(|r| format!("  = {}", r)));
            if self.unchanged.len() > 3 {
                lines.push(format!(
                    "  ... and {} more unchanged items",
                    self.unchanged.len() - 3
                ));
            }
        }
        lines.join("\n")
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty("Comparison Result"))
    }
}

fn common_shape<'r>(records: &'r [Record], list: &str) -> Result<Option<&'r str>> {
    let Some(first) = records.first() else {
        return Ok(None);
    };
    for (i, record) in records.iter().enumerate() {
        if record.shape() != first.shape() {
            return Err(StoreError::model_comparison(format!(
                "{}[{}] is a {} record, expected {}",
                list,
                i,
                record.shape(),
                first.shape()
            )));
        }
    }
    Ok(Some(first.shape()))
}

fn effective_key(old: &[Record], new: &[Record], options: &CompareOptions) -> BTreeSet<String> {
    if !options.key_fields.is_empty() {
        return options.key_fields.clone();
    }
    old.first()
        .into_iter()
        .chain(new.first())
        .flat_map(Record::field_names)
        .filter(|f| !options.exclude_fields.contains(*f))
        .map(str::to_string)
        .collect()
}

fn keys_of(records: &[Record], list: &str, key_fields: &BTreeSet<String>) -> Result<Vec<String>> {
    let mut seen = HashMap::with_capacity(records.len());
    let mut keys = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let mut parts = Vec::with_capacity(key_fields.len());
        for field in key_fields {
            let value = record.get(field).ok_or_else(|| {
                StoreError::model_comparison(format!(
                    "{}[{}] has no key field '{}'",
                    list, i, field
                ))
            })?;
            parts.push(canonical(value));
        }
        let key = Value::Array(parts).to_string();
        if let Some(first) = seen.insert(key.clone(), i) {
            return Err(StoreError::model_comparison(format!(
                "{}[{}] repeats the key {} of {}[{}]",
                list, i, key, list, first
            )));
        }
        keys.push(key);
    }
    Ok(keys)
}

/// `value` with every number rewritten in its shortest decimal form, so
/// that 1, 1.0 and 1.000 compare equal
fn canonical(value: &Value) -> Value {
    match value {
        Value::Number(n) => normalize_number(n).map_or_else(|| value.clone(), Value::Number),
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), canonical(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn normalize_number(n: &Number) -> Option<Number> {
    let text = n.to_string();
    let decimal = Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()?;
    Number::from_str(&decimal.normalize().to_string()).ok()
}

fn diff_fields(
    old: &Record,
    new: &Record,
    exclude: &BTreeSet<String>,
) -> BTreeMap<String, FieldChange> {
    let names: BTreeSet<&str> = old.field_names().chain(new.field_names()).collect();
    names
        .into_iter()
        .filter(|f| !exclude.contains(*f))
        .filter_map(|f| {
            let old_value = old.get(f).cloned().unwrap_or(Value::Null);
            let new_value = new.get(f).cloned().unwrap_or(Value::Null);
            (canonical(&old_value) != canonical(&new_value)).then(|| {
                (
                    f.to_string(),
                    FieldChange {
                        old: old_value,
                        new: new_value,
                    },
                )
            })
        })
        .collect()
}
