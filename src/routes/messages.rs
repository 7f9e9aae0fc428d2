use crate::{
    error::AppError,
    middleware::User,
    services::message_service::{ListMessagesQuery, SendMessageRequest},
    state::AppState,
};
use actix_web::{delete, get, patch, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub text: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub topic_id: Option<Uuid>,
}

/// POST /chats/{id}/messages
#[post("/chats/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let message = state
        .messages
        .send(user.id, chat_id.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(message))
}

/// GET /chats/{id}/messages?cursor=&limit=&topic_id=
///
/// Newest first; pass `next_cursor` back to continue.
#[get("/chats/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
    query: web::Query<ListMessagesQuery>,
) -> Result<HttpResponse, AppError> {
    let page = state
        .messages
        .list(user.id, chat_id.into_inner(), query.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /chats/{id}/messages/all
#[get("/chats/{id}/messages/all")]
pub async fn get_all_messages(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = state
        .messages
        .list_all(user.id, chat_id.into_inner(), query.topic_id)
        .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[patch("/chats/{id}/messages/{message_id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let (chat_id, message_id) = path.into_inner();
    let message = state
        .messages
        .edit(user.id, chat_id, message_id, body.into_inner().text)
        .await?;
    Ok(HttpResponse::Ok().json(message))
}

#[delete("/chats/{id}/messages/{message_id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (chat_id, message_id) = path.into_inner();
    state.messages.delete(user.id, chat_id, message_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
