use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::Json;
use serde_json::{json, Value};

use crate::entity::{NoteWithUser, UserSummary};
use crate::service::{
    messages, require_id, NewNote, NewUser, NoteUpdate, Services, UserUpdate,
};

use super::error::{not_found_body, ApiResult};

const INDEX_HTML: &str = "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"UTF-8\"><title>technotes</title></head>\n<body><h1>technotes</h1><p>Notes and users API.</p></body>\n</html>\n";

/// Read a request body as JSON; anything unreadable becomes `null` and
/// fails validation like a missing field would.
fn parse_body(body: &Bytes) -> Value {
    serde_json::from_slice(body).unwrap_or(Value::Null)
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn fallback() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(not_found_body()))
}

pub async fn list_users(State(services): State<Services>) -> ApiResult<Json<Vec<UserSummary>>> {
    let users = services.users.list_users().await?;
    Ok(Json(users))
}

pub async fn create_user(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input = NewUser::from_json(&parse_body(&body))?;
    let created = services.users.create_user(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": format!("New user {} created", created.username),
            "id": created.id,
        })),
    ))
}

pub async fn update_user(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let input = UserUpdate::from_json(&parse_body(&body))?;
    let username = services.users.update_user(input).await?;
    Ok(Json(json!({ "message": format!("{} updated", username) })))
}

pub async fn delete_user(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let id = require_id(&parse_body(&body), messages::USER_ID_REQUIRED)?;
    let deleted = services.users.delete_user(&id).await?;
    Ok(Json(format!(
        "Username {} with ID {} deleted",
        deleted.username, deleted.id
    )))
}

pub async fn list_notes(State(services): State<Services>) -> ApiResult<Json<Vec<NoteWithUser>>> {
    let notes = services.notes.list_notes().await?;
    Ok(Json(notes))
}

pub async fn create_note(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let input = NewNote::from_json(&parse_body(&body))?;
    let created = services.notes.create_note(input).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "message": "New note created",
            "id": created.id,
            "ticket": created.ticket,
        })),
    ))
}

pub async fn update_note(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let input = NoteUpdate::from_json(&parse_body(&body))?;
    let title = services.notes.update_note(input).await?;
    Ok(Json(format!("'{}' updated", title)))
}

pub async fn delete_note(
    State(services): State<Services>,
    body: Bytes,
) -> ApiResult<Json<String>> {
    let id = require_id(&parse_body(&body), messages::NOTE_ID_REQUIRED)?;
    let deleted = services.notes.delete_note(&id).await?;
    Ok(Json(format!(
        "Note '{}' with ID {} deleted",
        deleted.title, deleted.id
    )))
}
