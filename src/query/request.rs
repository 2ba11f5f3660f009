//! Table request value types
//!
//! A `TableRequest` mirrors the payload sent by data-table front ends:
//! column filters with per-column operators, a global search string, sort
//! keys and pagination. It is built once, either deserialized through the
//! request interpreter or assembled with the consuming `with_*` builder.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default page size when the request carries no pagination
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Filter operator names as sent on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterFn {
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    Fuzzy,
    Between,
    BetweenInclusive,
    In,
    NotIn,
    ArrIncludes,
    ArrIncludesSome,
    ArrIncludesAll,
    HasAny,
    HasAll,
    HasChild,
    HasNotChild,
    Auto,
    /// The caller applies this filter itself; compilation skips it
    Custom,
    /// Any name not listed above
    Other(String),
}

impl FilterFn {
    pub fn as_str(&self) -> &str {
        match self {
            FilterFn::Equals => "equals",
            FilterFn::NotEquals => "notEquals",
            FilterFn::LessThan => "lessThan",
            FilterFn::LessThanOrEqualTo => "lessThanOrEqualTo",
            FilterFn::GreaterThan => "greaterThan",
            FilterFn::GreaterThanOrEqualTo => "greaterThanOrEqualTo",
            FilterFn::Contains => "contains",
            FilterFn::NotContains => "notContains",
            FilterFn::StartsWith => "startsWith",
            FilterFn::EndsWith => "endsWith",
            FilterFn::Fuzzy => "fuzzy",
            FilterFn::Between => "between",
            FilterFn::BetweenInclusive => "betweenInclusive",
            FilterFn::In => "in",
            FilterFn::NotIn => "notIn",
            FilterFn::ArrIncludes => "arrIncludes",
            FilterFn::ArrIncludesSome => "arrIncludesSome",
            FilterFn::ArrIncludesAll => "arrIncludesAll",
            FilterFn::HasAny => "hasAny",
            FilterFn::HasAll => "hasAll",
            FilterFn::HasChild => "hasChild",
            FilterFn::HasNotChild => "hasNotChild",
            FilterFn::Auto => "auto",
            FilterFn::Custom => "custom",
            FilterFn::Other(name) => name,
        }
    }
}

impl From<&str> for FilterFn {
    fn from(name: &str) -> Self {
        match name {
            "equals" => FilterFn::Equals,
            "notEquals" => FilterFn::NotEquals,
            "lessThan" => FilterFn::LessThan,
            "lessThanOrEqualTo" => FilterFn::LessThanOrEqualTo,
            "greaterThan" => FilterFn::GreaterThan,
            "greaterThanOrEqualTo" => FilterFn::GreaterThanOrEqualTo,
            "contains" => FilterFn::Contains,
            "notContains" => FilterFn::NotContains,
            "startsWith" => FilterFn::StartsWith,
            "endsWith" => FilterFn::EndsWith,
            "fuzzy" => FilterFn::Fuzzy,
            "between" => FilterFn::Between,
            "betweenInclusive" => FilterFn::BetweenInclusive,
            "in" => FilterFn::In,
            "notIn" => FilterFn::NotIn,
            "arrIncludes" => FilterFn::ArrIncludes,
            "arrIncludesSome" => FilterFn::ArrIncludesSome,
            "arrIncludesAll" => FilterFn::ArrIncludesAll,
            "hasAny" => FilterFn::HasAny,
            "hasAll" => FilterFn::HasAll,
            "hasChild" => FilterFn::HasChild,
            "hasNotChild" => FilterFn::HasNotChild,
            "auto" => FilterFn::Auto,
            "custom" => FilterFn::Custom,
            other => FilterFn::Other(other.to_string()),
        }
    }
}

impl From<String> for FilterFn {
    fn from(name: String) -> Self {
        FilterFn::from(name.as_str())
    }
}

impl From<FilterFn> for String {
    fn from(f: FilterFn) -> Self {
        f.as_str().to_string()
    }
}

impl fmt::Display for FilterFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One column filter: a path and the raw value to compare against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub id: String,
    #[serde(default)]
    pub value: Value,
}

/// One sort key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sorting {
    pub id: String,
    #[serde(default)]
    pub desc: bool,
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    #[serde(default)]
    pub page_index: u32,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page_index: 0,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn new(page_index: u32, page_size: u32) -> Self {
        Self {
            page_index,
            page_size,
        }
    }

    pub fn offset(&self) -> u64 {
        self.page_index as u64 * self.page_size as u64
    }
}

fn default_global_filter_fn() -> FilterFn {
    FilterFn::Contains
}

/// Declarative table query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRequest {
    #[serde(default)]
    pub column_filters: Vec<ColumnFilter>,
    #[serde(default)]
    pub column_filter_fns: BTreeMap<String, FilterFn>,
    #[serde(default)]
    pub global_filter: String,
    #[serde(rename = "globalfilterFns", default = "default_global_filter_fn")]
    pub global_filter_fn: FilterFn,
    #[serde(default)]
    pub sorting: Vec<Sorting>,
    #[serde(default)]
    pub pagination: Pagination,
}

impl Default for TableRequest {
    fn default() -> Self {
        Self {
            column_filters: Vec::new(),
            column_filter_fns: BTreeMap::new(),
            global_filter: String::new(),
            global_filter_fn: default_global_filter_fn(),
            sorting: Vec::new(),
            pagination: Pagination::default(),
        }
    }
}

impl TableRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a column filter and set its operator
    pub fn with_column_filter(
        mut self,
        path: impl Into<String>,
        filter_fn: FilterFn,
        value: impl Into<Value>,
    ) -> Self {
        let path = path.into();
        self.column_filters.push(ColumnFilter {
            id: path.clone(),
            value: value.into(),
        });
        self.column_filter_fns.insert(path, filter_fn);
        self
    }

    /// Replace the global search text and operator
    pub fn with_global_filter(mut self, text: impl Into<String>, filter_fn: FilterFn) -> Self {
        self.global_filter = text.into();
        self.global_filter_fn = filter_fn;
        self
    }

    /// Append a sort key
    pub fn with_sorting(mut self, path: impl Into<String>, desc: bool) -> Self {
        self.sorting.push(Sorting {
            id: path.into(),
            desc,
        });
        self
    }

    /// Replace pagination
    pub fn with_pagination(mut self, page_index: u32, page_size: u32) -> Self {
        self.pagination = Pagination::new(page_index, page_size);
        self
    }

    /// Operator for `path`; filters without one are matched fuzzily
    pub fn filter_fn_for(&self, path: &str) -> FilterFn {
        self.column_filter_fns
            .get(path)
            .cloned()
            .unwrap_or(FilterFn::Fuzzy)
    }
}
