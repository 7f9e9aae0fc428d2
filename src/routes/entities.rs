//! Reaction, view and forward endpoints shared by every entity kind.
//!
//! `{kind}` accepts `messages`, `posts` and `stories` (singular forms too).

use crate::{
    error::AppError,
    middleware::User,
    models::{EntityKind, EntityRef},
    services::engagement::parse_destination,
    state::AppState,
};
use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ReactRequest {
    pub emoji: String,
}

/// Destination kept loose so malformed input maps to 400, not a decode error.
#[derive(Deserialize)]
pub struct ForwardRequest {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<String>,
}

#[derive(Serialize)]
pub struct ViewResponse {
    pub status: crate::models::ViewOutcome,
}

fn entity_ref(path: (String, Uuid)) -> Result<EntityRef, AppError> {
    let (kind, id) = path;
    let kind = kind.parse::<EntityKind>().map_err(AppError::BadRequest)?;
    Ok(EntityRef { kind, id })
}

/// POST /entities/{kind}/{id}/reactions
///
/// Toggles the caller's single reaction slot and returns the new summary.
#[post("/entities/{kind}/{id}/reactions")]
pub async fn react(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(String, Uuid)>,
    body: web::Json<ReactRequest>,
) -> Result<HttpResponse, AppError> {
    let entity = entity_ref(path.into_inner())?;
    let result = state.engagement.react(entity, user.id, &body.emoji).await?;
    Ok(HttpResponse::Ok().json(result))
}

#[post("/entities/{kind}/{id}/views")]
pub async fn add_view(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(String, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let entity = entity_ref(path.into_inner())?;
    let status = state.engagement.add_view(entity, user.id).await?;
    Ok(HttpResponse::Ok().json(ViewResponse { status }))
}

/// POST /entities/{kind}/{id}/forward
///
/// Body: `{"type": "chat" | "group" | "channel", "id": "<uuid>"}`
#[post("/entities/{kind}/{id}/forward")]
pub async fn forward(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(String, Uuid)>,
    body: web::Json<ForwardRequest>,
) -> Result<HttpResponse, AppError> {
    let entity = entity_ref(path.into_inner())?;
    let destination = parse_destination(body.kind.as_deref(), body.id.as_deref())?;
    let result = state
        .engagement
        .forward(entity, user.id, destination)
        .await?;
    Ok(HttpResponse::Created().json(result))
}
