use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::entity::{User, UserSummary};
use crate::storage::{from_document, to_document, DocumentStore, Filter, StoreError};

use super::error::{messages, Result, ServiceError};
use super::password::PasswordHasher;
use super::validation::{normalize_roles, NewUser, UserUpdate};
use super::{NOTES, USERS};

/// Result of a successful user creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedUser {
    pub id: String,
    pub username: String,
}

/// Identity of a user that has just been removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedUser {
    pub id: String,
    pub username: String,
}

/// Owns every write to the users collection.
pub struct UserService {
    store: Arc<dyn DocumentStore>,
    hasher: Arc<dyn PasswordHasher>,
}

impl UserService {
    pub fn new(store: Arc<dyn DocumentStore>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self { store, hasher }
    }

    /// Declare `username` unique at the storage layer as well
    pub async fn ensure_indexes(&self) -> Result<()> {
        self.store.ensure_unique(USERS, "username").await?;
        Ok(())
    }

    /// All users without their password hashes
    pub async fn list_users(&self) -> Result<Vec<UserSummary>> {
        let docs = self.store.find_many(USERS, None).await?;
        if docs.is_empty() {
            return Err(ServiceError::not_found(messages::NO_USERS_FOUND));
        }

        docs.into_iter()
            .map(|doc| -> Result<UserSummary> { Ok(from_document::<User>(doc)?.into()) })
            .collect()
    }

    pub async fn find_user(&self, id: &str) -> Result<Option<User>> {
        match self.store.find_by_id(USERS, id).await? {
            Some(doc) => Ok(Some(from_document(doc)?)),
            None => Ok(None),
        }
    }

    /// Username of an existing user; a missing user is a broken reference
    pub async fn username_of(&self, id: &str) -> Result<String> {
        self.find_user(id)
            .await?
            .map(|user| user.username)
            .ok_or_else(|| ServiceError::BrokenReference(format!("user {} does not exist", id)))
    }

    pub async fn create_user(&self, input: NewUser) -> Result<CreatedUser> {
        input.validate()?;

        let duplicate = self
            .store
            .find_one(USERS, &Filter::by("username", input.username.as_str()))
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::conflict(messages::DUPLICATE_USERNAME));
        }

        let password_hash = self.hash_password(input.password).await?;
        let doc = to_document(&json!({
            "username": input.username,
            "password": password_hash,
            "roles": normalize_roles(input.roles),
            "active": true,
        }))?;

        let id = self
            .store
            .create(USERS, doc)
            .await
            .map_err(|e| write_error(e, messages::INVALID_USER_DATA))?;

        tracing::info!(user_id = %id, username = %input.username, "user created");
        Ok(CreatedUser {
            id,
            username: input.username,
        })
    }

    /// Apply an update and return the stored username
    pub async fn update_user(&self, input: UserUpdate) -> Result<String> {
        input.validate()?;

        if self.store.find_by_id(USERS, &input.id).await?.is_none() {
            return Err(ServiceError::not_found(messages::USER_NOT_FOUND));
        }

        // Renaming a user to its own current name is allowed
        let duplicate = self
            .store
            .find_one(USERS, &Filter::by("username", input.username.as_str()))
            .await?;
        if let Some(other) = duplicate {
            if other.get("id").and_then(|v| v.as_str()) != Some(input.id.as_str()) {
                return Err(ServiceError::conflict(messages::DUPLICATE_USERNAME));
            }
        }

        let mut patch = to_document(&json!({
            "username": input.username,
            "roles": normalize_roles(input.roles.clone()),
            "active": input.active,
        }))?;
        if let Some(password) = input.new_password() {
            let hash = self.hash_password(password.to_string()).await?;
            patch.insert("password".to_string(), hash.into());
        }

        let updated = self
            .store
            .update(USERS, &input.id, patch)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ServiceError::not_found(messages::USER_NOT_FOUND),
                other => write_error(other, messages::INVALID_USER_DATA),
            })?;
        let user: User = from_document(updated)?;

        tracing::info!(user_id = %user.id, username = %user.username, "user updated");
        Ok(user.username)
    }

    /// Remove a user that owns no notes
    pub async fn delete_user(&self, id: &str) -> Result<DeletedUser> {
        if id.is_empty() {
            return Err(ServiceError::validation(messages::USER_ID_REQUIRED));
        }

        // Checked before existence, so an unknown id with notes still reports the notes
        let note = self
            .store
            .find_one(NOTES, &Filter::by("user", id))
            .await?;
        if note.is_some() {
            return Err(ServiceError::InUse(messages::USER_HAS_NOTES.to_string()));
        }

        if self.store.find_by_id(USERS, id).await?.is_none() {
            return Err(ServiceError::not_found(messages::USER_NOT_FOUND));
        }

        let removed = self.store.delete(USERS, id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => ServiceError::not_found(messages::USER_NOT_FOUND),
            other => ServiceError::Store(other),
        })?;
        let user: User = from_document(removed)?;

        tracing::info!(user_id = %user.id, username = %user.username, "user deleted");
        Ok(DeletedUser {
            id: user.id,
            username: user.username,
        })
    }

    async fn hash_password(&self, plaintext: String) -> Result<String> {
        let hasher = Arc::clone(&self.hasher);
        tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
            .await
            .map_err(|e| ServiceError::Hash(e.to_string()))?
    }
}

/// Map a rejected write onto the caller-facing error
pub(crate) fn write_error(err: StoreError, invalid_message: &str) -> ServiceError {
    match err {
        StoreError::UniqueViolation {
            ref collection,
            ref field,
        } if collection == USERS && field == "username" => {
            ServiceError::conflict(messages::DUPLICATE_USERNAME)
        }
        StoreError::UniqueViolation {
            ref collection,
            ref field,
        } if collection == NOTES && field == "title" => {
            ServiceError::conflict(messages::DUPLICATE_NOTE_TITLE)
        }
        StoreError::Rejected(_) => ServiceError::InvalidData(invalid_message.to_string()),
        other => ServiceError::Store(other),
    }
}
