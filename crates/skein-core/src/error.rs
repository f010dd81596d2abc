//! Error types for the Skein overlay.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("identifier must be {expected} hex digits, got {got}")] InvalidLength { got: usize, expected: usize },
    #[error("identifier is not valid hex")] InvalidHex,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("identifier {0} is already hosted in this pool")] DuplicateId(String),
}
