pub mod dictionary;
pub mod resolver;
