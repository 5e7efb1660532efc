pub mod expr;
pub mod failed_row;
