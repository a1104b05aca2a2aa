use thiserror::Error;

/// Errors produced while constructing or parsing foundation types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("unknown role: {0}")]
    UnknownRole(String),
}
