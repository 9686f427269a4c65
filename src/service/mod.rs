//! Domain services for users and notes.
//!
//! Each service validates its input, checks uniqueness and references, and
//! only then writes through the shared [`DocumentStore`].

mod counter;
mod error;
mod notes;
mod password;
mod users;
mod validation;

pub use counter::{TicketCounter, FIRST_TICKET, TICKET_SEQUENCE};
pub use error::{messages, ErrorKind, Result, ServiceError};
pub use notes::{CreatedNote, DeletedNote, NoteService};
pub use password::{BcryptHasher, PasswordHasher, DEFAULT_COST, MAX_COST, MIN_COST};
pub use users::{CreatedUser, DeletedUser, UserService};
pub use validation::{normalize_roles, require_id, NewNote, NewUser, NoteUpdate, UserUpdate};

use std::sync::Arc;

use crate::storage::DocumentStore;

pub const USERS: &str = "users";
pub const NOTES: &str = "notes";

/// The services sharing one store, as handed to the HTTP layer and the CLI.
#[derive(Clone)]
pub struct Services {
    pub users: Arc<UserService>,
    pub notes: Arc<NoteService>,
}

impl Services {
    /// Wire both services over `store` and declare their unique fields
    pub async fn new(store: Arc<dyn DocumentStore>, hasher: Arc<dyn PasswordHasher>) -> Result<Self> {
        let users = Arc::new(UserService::new(Arc::clone(&store), hasher));
        let notes = Arc::new(NoteService::new(store, Arc::clone(&users)));

        users.ensure_indexes().await?;
        notes.ensure_indexes().await?;

        Ok(Self { users, notes })
    }
}
