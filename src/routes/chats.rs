use crate::{error::AppError, middleware::User, state::AppState};
use actix_web::{get, patch, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreatePrivateChatRequest {
    pub participant_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateGroupChatRequest {
    pub group_id: Uuid,
}

#[derive(Deserialize)]
pub struct ChatSettingsRequest {
    pub pinned: Option<bool>,
    pub muted: Option<bool>,
}

#[derive(Serialize)]
pub struct MarkReadResponse {
    pub chat_id: Uuid,
    pub marked: u64,
}

#[derive(Serialize)]
pub struct UnreadResponse {
    pub chat_id: Uuid,
    pub unread: u64,
}

/// POST /chats/private
///
/// 409 with `existing_id` when the pair already has a chat.
#[post("/chats/private")]
pub async fn create_private_chat(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreatePrivateChatRequest>,
) -> Result<HttpResponse, AppError> {
    let chat = state
        .conversations
        .create_private(user.id, &body.participant_ids)
        .await?;
    Ok(HttpResponse::Created().json(chat))
}

/// POST /chats/group
#[post("/chats/group")]
pub async fn create_group_chat(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupChatRequest>,
) -> Result<HttpResponse, AppError> {
    let chat = state
        .conversations
        .create_group_chat(user.id, body.group_id)
        .await?;
    Ok(HttpResponse::Created().json(chat))
}

#[patch("/chats/{id}/settings")]
pub async fn update_chat_settings(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
    body: web::Json<ChatSettingsRequest>,
) -> Result<HttpResponse, AppError> {
    let chat = state
        .conversations
        .set_chat_flags(user.id, chat_id.into_inner(), body.pinned, body.muted)
        .await?;
    Ok(HttpResponse::Ok().json(chat))
}

#[post("/chats/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let chat_id = chat_id.into_inner();
    let marked = state.reads.mark_read(user.id, chat_id).await?;
    Ok(HttpResponse::Ok().json(MarkReadResponse { chat_id, marked }))
}

#[get("/chats/{id}/unread")]
pub async fn unread_count(
    state: web::Data<AppState>,
    user: User,
    chat_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let chat_id = chat_id.into_inner();
    let unread = state.reads.unread_count(user.id, chat_id).await?;
    Ok(HttpResponse::Ok().json(UnreadResponse { chat_id, unread }))
}
