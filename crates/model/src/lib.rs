pub mod core;
pub mod execution;
pub mod plan;
pub mod records;
pub mod rules;
