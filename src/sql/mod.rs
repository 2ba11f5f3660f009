//! SQL rendering: condition trees, identifier sanitization and DDL

pub mod condition;
pub mod ddl;
pub mod sanitize;

pub use condition::{
    build_condition_clause, build_order_by_clause, ColumnRef, CompareOp, Condition, Join,
    OrderTerm, Subquery, TableRef,
};
pub use ddl::DdlGenerator;
pub use sanitize::{POSTGRES_RESERVED_WORDS, quote_identifier, split_path, validate_identifier};
