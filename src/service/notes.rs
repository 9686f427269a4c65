use std::sync::Arc;

use futures::future::try_join_all;
use serde::Serialize;
use serde_json::json;

use crate::entity::{Note, NoteWithUser};
use crate::storage::{from_document, to_document, DocumentStore, Filter, StoreError};

use super::counter::TicketCounter;
use super::error::{messages, Result, ServiceError};
use super::users::{write_error, UserService};
use super::validation::{NewNote, NoteUpdate};
use super::NOTES;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedNote {
    pub id: String,
    pub ticket: i64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletedNote {
    pub id: String,
    pub title: String,
}

/// Owns every write to the notes collection.
///
/// Reads users only to resolve the owner's username for listings.
pub struct NoteService {
    store: Arc<dyn DocumentStore>,
    users: Arc<UserService>,
    tickets: TicketCounter,
}

impl NoteService {
    pub fn new(store: Arc<dyn DocumentStore>, users: Arc<UserService>) -> Self {
        let tickets = TicketCounter::new(Arc::clone(&store));
        Self {
            store,
            users,
            tickets,
        }
    }

    pub async fn ensure_indexes(&self) -> Result<()> {
        self.store.ensure_unique(NOTES, "title").await?;
        Ok(())
    }

    /// All notes in store order, each with its owner's username
    pub async fn list_notes(&self) -> Result<Vec<NoteWithUser>> {
        let docs = self.store.find_many(NOTES, None).await?;
        if docs.is_empty() {
            return Err(ServiceError::not_found(messages::NO_NOTES_FOUND));
        }

        let notes = docs
            .into_iter()
            .map(from_document::<Note>)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // try_join_all keeps input order; one failed lookup fails the listing
        try_join_all(notes.into_iter().map(|note| async move {
            let username = self.users.username_of(&note.user).await?;
            Ok::<_, ServiceError>(NoteWithUser { note, username })
        }))
        .await
    }

    pub async fn create_note(&self, input: NewNote) -> Result<CreatedNote> {
        input.validate()?;

        let duplicate = self
            .store
            .find_one(NOTES, &Filter::by("title", input.title.as_str()))
            .await?;
        if duplicate.is_some() {
            return Err(ServiceError::conflict(messages::DUPLICATE_NOTE_TITLE));
        }

        let ticket = self.tickets.next().await?;
        let doc = to_document(&json!({
            "user": input.user,
            "title": input.title,
            "text": input.text,
            "completed": false,
            "ticket": ticket,
        }))?;

        let id = self
            .store
            .create(NOTES, doc)
            .await
            .map_err(|e| write_error(e, messages::INVALID_NOTE_DATA))?;

        tracing::info!(note_id = %id, ticket, title = %input.title, "note created");
        Ok(CreatedNote {
            id,
            ticket,
            title: input.title,
        })
    }

    /// Apply an update and return the stored title
    pub async fn update_note(&self, input: NoteUpdate) -> Result<String> {
        input.validate()?;

        if self.store.find_by_id(NOTES, &input.id).await?.is_none() {
            return Err(ServiceError::not_found(messages::NOTE_NOT_FOUND));
        }

        let duplicate = self
            .store
            .find_one(NOTES, &Filter::by("title", input.title.as_str()))
            .await?;
        if let Some(other) = duplicate {
            if other.get("id").and_then(|v| v.as_str()) != Some(input.id.as_str()) {
                return Err(ServiceError::conflict(messages::DUPLICATE_NOTE_TITLE));
            }
        }

        let patch = to_document(&json!({
            "user": input.user,
            "title": input.title,
            "text": input.text,
            "completed": input.completed,
        }))?;

        let updated = self
            .store
            .update(NOTES, &input.id, patch)
            .await
            .map_err(|e| match e {
                StoreError::NotFound { .. } => ServiceError::not_found(messages::NOTE_NOT_FOUND),
                other => write_error(other, messages::INVALID_NOTE_DATA),
            })?;
        let note: Note = from_document(updated)?;

        tracing::info!(note_id = %note.id, ticket = note.ticket, "note updated");
        Ok(note.title)
    }

    pub async fn delete_note(&self, id: &str) -> Result<DeletedNote> {
        if id.is_empty() {
            return Err(ServiceError::validation(messages::NOTE_ID_REQUIRED));
        }

        if self.store.find_by_id(NOTES, id).await?.is_none() {
            return Err(ServiceError::not_found(messages::NOTE_NOT_FOUND));
        }

        let removed = self.store.delete(NOTES, id).await.map_err(|e| match e {
            StoreError::NotFound { .. } => ServiceError::not_found(messages::NOTE_NOT_FOUND),
            other => ServiceError::Store(other),
        })?;
        let note: Note = from_document(removed)?;

        tracing::info!(note_id = %note.id, ticket = note.ticket, "note deleted");
        Ok(DeletedNote {
            id: note.id,
            title: note.title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::password::{BcryptHasher, MIN_COST};
    use crate::service::validation::NewUser;
    use crate::service::{ErrorKind, USERS};
    use crate::storage::{LoroStore, SqliteStore};

    async fn setup_with(store: Arc<dyn DocumentStore>) -> (Arc<UserService>, NoteService) {
        let hasher = Arc::new(BcryptHasher::new(MIN_COST).unwrap());
        let users = Arc::new(UserService::new(store.clone(), hasher));
        users.ensure_indexes().await.unwrap();
        let notes = NoteService::new(store, users.clone());
        notes.ensure_indexes().await.unwrap();
        (users, notes)
    }

    async fn setup() -> (Arc<UserService>, NoteService, Arc<dyn DocumentStore>) {
        let store: Arc<dyn DocumentStore> = Arc::new(LoroStore::in_memory());
        let (users, notes) = setup_with(store.clone()).await;
        (users, notes, store)
    }

    async fn add_user(users: &UserService, username: &str) -> String {
        users
            .create_user(NewUser {
                username: username.to_string(),
                password: "pw".to_string(),
                roles: vec!["Employee".to_string()],
            })
            .await
            .unwrap()
            .id
    }

    fn new_note(user: &str, title: &str) -> NewNote {
        NewNote {
            user: user.to_string(),
            title: title.to_string(),
            text: "details".to_string(),
        }
    }

    fn note_update(id: &str, user: &str, title: &str) -> NoteUpdate {
        NoteUpdate {
            id: id.to_string(),
            user: user.to_string(),
            title: title.to_string(),
            text: "changed".to_string(),
            completed: true,
        }
    }

    #[tokio::test]
    async fn test_list_notes_empty_is_not_found() {
        let (_, notes, _) = setup().await;
        let err = notes.list_notes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.to_string(), "No notes found");
    }

    #[tokio::test]
    async fn test_create_note_assigns_tickets_from_500() {
        let (users, notes, _) = setup().await;
        let alice = add_user(&users, "alice").await;

        let first = notes.create_note(new_note(&alice, "Printer")).await.unwrap();
        let second = notes.create_note(new_note(&alice, "Scanner")).await.unwrap();
        assert_eq!(first.ticket, 500);
        assert_eq!(second.ticket, 501);
    }

    #[tokio::test]
    async fn test_tickets_are_not_reused_after_delete() {
        let (users, notes, _) = setup().await;
        let alice = add_user(&users, "alice").await;

        let first = notes.create_note(new_note(&alice, "Printer")).await.unwrap();
        notes.delete_note(&first.id).await.unwrap();

        let second = notes.create_note(new_note(&alice, "Scanner")).await.unwrap();
        assert_eq!(second.ticket, 501);
    }

    #[tokio::test]
    async fn test_list_notes_joins_usernames_in_order() {
        let (users, notes, _) = setup().await;
        let alice = add_user(&users, "alice").await;
        let bob = add_user(&users, "bob").await;

        notes.create_note(new_note(&alice, "First")).await.unwrap();
        notes.create_note(new_note(&bob, "Second")).await.unwrap();

        let listed = notes.list_notes().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].note.title, "First");
        assert_eq!(listed[0].username, "alice");
        assert_eq!(listed[1].note.title, "Second");
        assert_eq!(listed[1].username, "bob");
        assert!(!listed[0].note.completed);
    }

    #[tokio::test]
    async fn test_list_notes_fails_on_dangling_owner() {
        let (_, notes, _) = setup().await;
        notes.create_note(new_note("ghost", "Orphan")).await.unwrap();

        let err = notes.list_notes().await.unwrap_err();
        assert!(matches!(err, ServiceError::BrokenReference(_)));
    }

    #[tokio::test]
    async fn test_duplicate_title_conflicts_without_consuming_a_ticket() {
        let (users, notes, store) = setup().await;
        let alice = add_user(&users, "alice").await;
        notes.create_note(new_note(&alice, "Printer")).await.unwrap();

        let err = notes.create_note(new_note(&alice, "Printer")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(err.to_string(), "Duplicate note title");
        assert_eq!(store.find_many(NOTES, None).await.unwrap().len(), 1);

        let next = notes.create_note(new_note(&alice, "Scanner")).await.unwrap();
        assert_eq!(next.ticket, 501);
    }

    #[tokio::test]
    async fn test_update_note_keeps_own_title() {
        let (users, notes, store) = setup().await;
        let alice = add_user(&users, "alice").await;
        let created = notes.create_note(new_note(&alice, "Printer")).await.unwrap();

        let title = notes
            .update_note(note_update(&created.id, &alice, "Printer"))
            .await
            .unwrap();
        assert_eq!(title, "Printer");

        let stored = store.find_by_id(NOTES, &created.id).await.unwrap().unwrap();
        assert_eq!(stored["completed"], true);
        assert_eq!(stored["text"], "changed");
        assert_eq!(stored["ticket"], 500);
    }

    #[tokio::test]
    async fn test_update_note_to_taken_title_conflicts() {
        let (users, notes, store) = setup().await;
        let alice = add_user(&users, "alice").await;
        notes.create_note(new_note(&alice, "Printer")).await.unwrap();
        let other = notes.create_note(new_note(&alice, "Scanner")).await.unwrap();

        let err = notes
            .update_note(note_update(&other.id, &alice, "Printer"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let stored = store.find_by_id(NOTES, &other.id).await.unwrap().unwrap();
        assert_eq!(stored["title"], "Scanner");
        assert_eq!(stored["completed"], false);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_note() {
        let (_, notes, _) = setup().await;

        let err = notes
            .update_note(note_update("nope", "u1", "Title"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Note not found");

        let err = notes.delete_note("nope").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = notes.delete_note("").await.unwrap_err();
        assert_eq!(err.to_string(), "Note ID required");
    }

    #[tokio::test]
    async fn test_delete_note_returns_former_title() {
        let (users, notes, _) = setup().await;
        let alice = add_user(&users, "alice").await;
        let created = notes.create_note(new_note(&alice, "Printer")).await.unwrap();

        let deleted = notes.delete_note(&created.id).await.unwrap();
        assert_eq!(deleted.title, "Printer");
        assert_eq!(deleted.id, created.id);
    }

    async fn run_scenario(store: Arc<dyn DocumentStore>) {
        let (users, notes) = setup_with(store.clone()).await;

        let alice = add_user(&users, "alice").await;
        let err = users
            .create_user(NewUser {
                username: "alice".to_string(),
                password: "other".to_string(),
                roles: vec!["Admin".to_string()],
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Duplicate username");

        let note = notes.create_note(new_note(&alice, "Fix printer")).await.unwrap();
        assert_eq!(note.ticket, 500);

        let err = users.delete_user(&alice).await.unwrap_err();
        assert_eq!(err.to_string(), "User has assigned notes");

        notes.delete_note(&note.id).await.unwrap();
        users.delete_user(&alice).await.unwrap();
        assert!(store.find_many(USERS, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scenario_on_loro() {
        run_scenario(Arc::new(LoroStore::in_memory())).await;
    }

    #[tokio::test]
    async fn test_scenario_on_sqlite() {
        run_scenario(Arc::new(SqliteStore::in_memory().unwrap())).await;
    }
}
