use crate::config::ConfigurationError;
use crate::registry::RegistryError;
use crate::store::{SessionError, StoreError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Invalid dispatcher state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, NotifierError>;
