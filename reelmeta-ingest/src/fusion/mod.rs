//! Merge engine: priority tables and field-wise merge

pub mod merger;
pub mod priority;

pub use merger::merge;
pub use priority::FieldPriorityTable;
