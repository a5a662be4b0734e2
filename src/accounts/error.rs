use thiserror::Error;

use crate::kv::KvError;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid account: {0}")]
    Invalid(String),

    #[error("store error: {0}")]
    Store(#[from] KvError),
}

pub type Result<T> = std::result::Result<T, AccountError>;
