//! Declarative table queries
//!
//! A raw request is normalized by `RequestInterpreter`, its dotted paths are
//! analyzed by `PathInspector` and resolved to joins by `PathResolver`, and
//! `QueryCompiler` assembles the final SQL from the operator filters.

pub mod compiler;
pub mod filters;
pub mod inspector;
pub mod interpreter;
pub mod request;
pub mod resolver;

pub use compiler::{CompiledQuery, InvalidPath, PathStage, QueryCompiler, SqlQuery};
pub use filters::{dispatch, FilterKind, RelationCondition, SubOperator};
pub use inspector::{Link, PathInfo, PathInspector, PathKind, RelationStep};
pub use interpreter::RequestInterpreter;
pub use request::{ColumnFilter, FilterFn, Pagination, Sorting, TableRequest, DEFAULT_PAGE_SIZE};
pub use resolver::{AliasSeq, JoinSpec, PathResolver, RelationRef, ResolvedPath, ResolvedTarget};
