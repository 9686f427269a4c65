//! Explicit input validation for the user and note operations.
//!
//! Requests arrive as untyped JSON so that a wrong type (for example
//! `"active": "true"`) is reported as a validation error with the same
//! message as a missing field. Every check here runs before the store is
//! touched.

use serde_json::Value;

use super::error::{messages, Result, ServiceError};

fn string_field(body: &Value, field: &str) -> Option<String> {
    match body.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn bool_field(body: &Value, field: &str) -> Option<bool> {
    body.get(field).and_then(Value::as_bool)
}

fn roles_field(body: &Value) -> Option<Vec<String>> {
    let items = body.get("roles")?.as_array()?;
    items
        .iter()
        .map(|item| item.as_str().map(str::to_string))
        .collect()
}

fn require(condition: bool) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ServiceError::validation(messages::ALL_FIELDS_REQUIRED))
    }
}

fn required(value: Option<String>) -> Result<String> {
    value.ok_or_else(|| ServiceError::validation(messages::ALL_FIELDS_REQUIRED))
}

/// Collapse repeated roles, keeping the first occurrence
pub fn normalize_roles(roles: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(roles.len());
    for role in roles {
        if !unique.contains(&role) {
            unique.push(role);
        }
    }
    unique
}

fn valid_roles(roles: &[String]) -> bool {
    !roles.is_empty() && roles.iter().all(|r| !r.is_empty())
}

/// Extract a required document id, failing with `message` when absent
pub fn require_id(body: &Value, message: &str) -> Result<String> {
    string_field(body, "id").ok_or_else(|| ServiceError::validation(message))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub roles: Vec<String>,
}

impl NewUser {
    pub fn from_json(body: &Value) -> Result<Self> {
        let user = Self {
            username: required(string_field(body, "username"))?,
            password: required(string_field(body, "password"))?,
            roles: roles_field(body)
                .ok_or_else(|| ServiceError::validation(messages::ALL_FIELDS_REQUIRED))?,
        };
        user.validate()?;
        Ok(user)
    }

    pub fn validate(&self) -> Result<()> {
        require(!self.username.is_empty() && !self.password.is_empty() && valid_roles(&self.roles))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserUpdate {
    pub id: String,
    pub username: String,
    pub roles: Vec<String>,
    pub active: bool,
    /// Replaces the stored password when present and non-empty
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn from_json(body: &Value) -> Result<Self> {
        let password = match body.get("password") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(ServiceError::validation(messages::ALL_FIELDS_REQUIRED)),
        };

        let update = Self {
            id: required(string_field(body, "id"))?,
            username: required(string_field(body, "username"))?,
            roles: roles_field(body)
                .ok_or_else(|| ServiceError::validation(messages::ALL_FIELDS_REQUIRED))?,
            active: bool_field(body, "active")
                .ok_or_else(|| ServiceError::validation(messages::ALL_FIELDS_REQUIRED))?,
            password,
        };
        update.validate()?;
        Ok(update)
    }

    pub fn validate(&self) -> Result<()> {
        require(!self.id.is_empty() && !self.username.is_empty() && valid_roles(&self.roles))
    }

    /// The new password, if one was actually supplied
    pub fn new_password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNote {
    pub user: String,
    pub title: String,
    pub text: String,
}

impl NewNote {
    pub fn from_json(body: &Value) -> Result<Self> {
        let note = Self {
            user: required(string_field(body, "user"))?,
            title: required(string_field(body, "title"))?,
            text: required(string_field(body, "text"))?,
        };
        note.validate()?;
        Ok(note)
    }

    pub fn validate(&self) -> Result<()> {
        require(!self.user.is_empty() && !self.title.is_empty() && !self.text.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteUpdate {
    pub id: String,
    pub user: String,
    pub title: String,
    pub text: String,
    pub completed: bool,
}

impl NoteUpdate {
    pub fn from_json(body: &Value) -> Result<Self> {
        let update = Self {
            id: required(string_field(body, "id"))?,
            user: required(string_field(body, "user"))?,
            title: required(string_field(body, "title"))?,
            text: required(string_field(body, "text"))?,
            completed: bool_field(body, "completed")
                .ok_or_else(|| ServiceError::validation(messages::ALL_FIELDS_REQUIRED))?,
        };
        update.validate()?;
        Ok(update)
    }

    pub fn validate(&self) -> Result<()> {
        require(
            !self.id.is_empty()
                && !self.user.is_empty()
                && !self.title.is_empty()
                && !self.text.is_empty(),
        )
    }
}
