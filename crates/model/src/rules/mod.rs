pub mod aggregation;
pub mod condition;
pub mod document;
pub mod latest;
pub mod sync_rule;
