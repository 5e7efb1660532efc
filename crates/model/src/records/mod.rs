pub mod batch;
pub mod key;
pub mod row;
