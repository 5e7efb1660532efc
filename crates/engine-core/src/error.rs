use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Unresolved variable {{{0}}}: not defined in the data dictionary")]
    UnresolvedVariable(String),
}
