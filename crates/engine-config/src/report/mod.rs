pub mod finding;
pub mod summary;
