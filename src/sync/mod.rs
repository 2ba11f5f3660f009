//! Structural diff and nested relation reconciliation
//!
//! The `Comparator` classifies two record lists. The
//! `RelationshipReconciler` applies that classification to a parent's
//! loaded children, and the `GraphSynchronizer` drives it through the
//! relation graph for create, update, delete and restore.

pub mod comparator;
pub mod metadata;
pub mod payload;
pub mod reconciler;
pub mod record;
pub mod synchronizer;

pub use comparator::{CompareOptions, Comparator, FieldChange, ModifiedItem};
pub use metadata::MetadataStamper;
pub use payload::{PayloadField, PayloadSchema};
pub use reconciler::{ChildFactory, ReconcileReport, RelationshipReconciler};
pub use record::Record;
pub use synchronizer::{DeleteMode, GraphSynchronizer, SyncContext, SyncOutcome};
