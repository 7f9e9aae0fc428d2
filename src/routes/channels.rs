use crate::{error::AppError, middleware::User, models::MessageContent, state::AppState};
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub admin_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct PublishPostRequest {
    pub content: MessageContent,
}

#[derive(Deserialize)]
pub struct PostStoryRequest {
    pub content: MessageContent,
    /// Lifetime in seconds; server default when absent
    pub ttl_secs: Option<u64>,
}

#[post("/channels")]
pub async fn create_channel(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateChannelRequest>,
) -> Result<HttpResponse, AppError> {
    let channel = state
        .channels
        .create_channel(user.id, &body.name, &body.admin_ids)
        .await?;
    Ok(HttpResponse::Created().json(channel))
}

#[get("/channels/{id}")]
pub async fn get_channel(
    state: web::Data<AppState>,
    _user: User,
    channel_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let channel = state.channels.get_channel(channel_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(channel))
}

/// POST /channels/{id}/posts
///
/// Authorization: channel owner or channel admin
#[post("/channels/{id}/posts")]
pub async fn publish_post(
    state: web::Data<AppState>,
    user: User,
    channel_id: web::Path<Uuid>,
    body: web::Json<PublishPostRequest>,
) -> Result<HttpResponse, AppError> {
    let post = state
        .channels
        .publish_post(user.id, channel_id.into_inner(), body.into_inner().content)
        .await?;
    Ok(HttpResponse::Created().json(post))
}

#[get("/posts/{id}")]
pub async fn get_post(
    state: web::Data<AppState>,
    user: User,
    post_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let post = state.channels.get_post(user.id, post_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[post("/stories")]
pub async fn post_story(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<PostStoryRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let story = state
        .channels
        .post_story(user.id, body.content, body.ttl_secs)
        .await?;
    Ok(HttpResponse::Created().json(story))
}

/// GET /stories/{id}
///
/// Expired stories are 404.
#[get("/stories/{id}")]
pub async fn get_story(
    state: web::Data<AppState>,
    user: User,
    story_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let story = state.channels.get_story(user.id, story_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(story))
}
