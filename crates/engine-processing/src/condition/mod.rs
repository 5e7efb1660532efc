pub mod compare;
pub mod evaluator;
