pub mod error;
pub mod loader;
pub mod sync;
pub mod validated;
pub mod validator;
