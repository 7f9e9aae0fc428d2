//! Group management endpoints
//!
//! Role and permission checks live in `GroupService`; these handlers only
//! decode requests.

use crate::{
    error::AppError, middleware::User, models::GroupSettings, permissions::PermissionOverrides,
    state::AppState,
};
use actix_web::{get, patch, post, put, web, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

// ============================================
// Request DTOs
// ============================================

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<Uuid>,
}

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

// ============================================
// Endpoints
// ============================================

#[post("/groups")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .create_group(user.id, &body.name, &body.member_ids)
        .await?;
    Ok(HttpResponse::Created().json(group))
}

/// GET /groups/{id}
///
/// Members only.
#[get("/groups/{id}")]
pub async fn get_group(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let group = state.groups.get(user.id, group_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(group))
}

/// PATCH /groups/{id}
///
/// Authorization: admin, or `can_change_chat_info`
#[patch("/groups/{id}")]
pub async fn rename_group(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
    body: web::Json<RenameGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .rename(user.id, group_id.into_inner(), &body.name)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

/// POST /groups/{id}/members
///
/// Authorization: admin, or `can_add_members`
#[post("/groups/{id}/members")]
pub async fn add_member(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .add_member(user.id, group_id.into_inner(), body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

/// POST /groups/{id}/admins
///
/// Authorization: owner
#[post("/groups/{id}/admins")]
pub async fn promote_admin(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .promote_admin(user.id, group_id.into_inner(), body.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

/// PUT /groups/{id}/permissions
///
/// Partial update: absent fields keep their current group default.
#[put("/groups/{id}/permissions")]
pub async fn update_permissions(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
    body: web::Json<PermissionOverrides>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .update_permissions(user.id, group_id.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

#[put("/groups/{id}/exceptions/{user_id}")]
pub async fn set_member_exception(
    state: web::Data<AppState>,
    user: User,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<PermissionOverrides>,
) -> Result<HttpResponse, AppError> {
    let (group_id, member_id) = path.into_inner();
    let group = state
        .groups
        .set_member_exception(user.id, group_id, member_id, body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(group))
}

#[put("/groups/{id}/settings")]
pub async fn update_settings(
    state: web::Data<AppState>,
    user: User,
    group_id: web::Path<Uuid>,
    body: web::Json<GroupSettings>,
) -> Result<HttpResponse, AppError> {
    let group = state
        .groups
        .update_settings(user.id, group_id.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(group))
}
