// src/entity/note.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub ticket: i64,
    /// Id of the owning user
    pub user: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A note together with the username of its owner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteWithUser {
    #[serde(flatten)]
    pub note: Note,
    pub username: String,
}
