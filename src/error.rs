use thiserror::Error;

use crate::service::ServiceError;
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum TechNotesError {
    #[error("Not in a technotes project. Run 'technotes init' first.")]
    NotInitialized,

    #[error("Already initialized. Remove .technotes/ to reinitialize.")]
    AlreadyInitialized,

    #[error("Invalid backend: {0}")]
    InvalidBackend(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Service(#[from] ServiceError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, TechNotesError>;
