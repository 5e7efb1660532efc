pub mod aggregate;
pub mod condition;
pub mod error;
pub mod index;
pub mod planner;
pub mod retry;
pub mod rule;
pub mod writer;
