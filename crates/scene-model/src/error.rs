use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("empty object id")]
    EmptyObjectId,
    #[error("empty property path")]
    EmptyPath,
    #[error("empty property name at position {index}")]
    EmptyComponent { index: usize },
}
