//! Service error taxonomy and the caller-facing messages.

use thiserror::Error;

use crate::storage::StoreError;

/// Messages surfaced to callers.
pub mod messages {
    pub const ALL_FIELDS_REQUIRED: &str = "All fields are required";
    pub const USER_ID_REQUIRED: &str = "User ID required";
    pub const NOTE_ID_REQUIRED: &str = "Note ID required";
    pub const NO_USERS_FOUND: &str = "No users found";
    pub const NO_NOTES_FOUND: &str = "No notes found";
    pub const USER_NOT_FOUND: &str = "User not found";
    pub const NOTE_NOT_FOUND: &str = "Note not found";
    pub const DUPLICATE_USERNAME: &str = "Duplicate username";
    pub const DUPLICATE_NOTE_TITLE: &str = "Duplicate note title";
    pub const USER_HAS_NOTES: &str = "User has assigned notes";
    pub const INVALID_USER_DATA: &str = "Invalid user data received";
    pub const INVALID_NOTE_DATA: &str = "Invalid note data received";
}

/// Error class, independent of the message carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed input, detected before any store access
    Validation,
    NotFound,
    /// Uniqueness or referential-integrity violation
    Conflict,
    /// The store refused an otherwise valid write
    InvalidData,
    StoreFailure,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// A unique field would be duplicated
    #[error("{0}")]
    Conflict(String),

    /// The entity is still referenced by others
    #[error("{0}")]
    InUse(String),

    #[error("{0}")]
    InvalidData(String),

    /// Stored data references an entity that no longer exists
    #[error("Broken reference: {0}")]
    BrokenReference(String),

    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Validation(_) => ErrorKind::Validation,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::Conflict(_) | ServiceError::InUse(_) => ErrorKind::Conflict,
            ServiceError::InvalidData(_) => ErrorKind::InvalidData,
            ServiceError::BrokenReference(_) | ServiceError::Hash(_) | ServiceError::Store(_) => {
                ErrorKind::StoreFailure
            }
        }
    }

    pub(crate) fn validation(message: &str) -> Self {
        ServiceError::Validation(message.to_string())
    }

    pub(crate) fn not_found(message: &str) -> Self {
        ServiceError::NotFound(message.to_string())
    }

    pub(crate) fn conflict(message: &str) -> Self {
        ServiceError::Conflict(message.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
