//! User management. Users may read and edit themselves; admins anyone.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::UserId;
use domain::{User, UserSummary};
use services::{NewUser, UserPatch, UserUpdate};
use store::Store;

use super::{JsonBody, PathParam};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/users", get(list::<S>).post(create::<S>))
        .route(
            "/users/{id}",
            get(get_one::<S>)
                .put(replace::<S>)
                .patch(update::<S>)
                .delete(delete::<S>),
        )
}

pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.accounts.list_users().await?))
}

/// POST /users. Unlike registration, the role may be chosen.
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    JsonBody(input): JsonBody<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.accounts.create_user(input).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn get_one<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<UserId>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(state.accounts.get_user(id, current.actor()).await?))
}

/// PUT /users/{id}
pub async fn replace<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<UserId>,
    JsonBody(update): JsonBody<UserUpdate>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state
            .accounts
            .update_user(id, current.actor(), update)
            .await?,
    ))
}

/// PATCH /users/{id}
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<UserId>,
    JsonBody(patch): JsonBody<UserPatch>,
) -> Result<Json<User>, ApiError> {
    Ok(Json(
        state.accounts.patch_user(id, current.actor(), patch).await?,
    ))
}

pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<UserId>,
) -> Result<StatusCode, ApiError> {
    state.accounts.delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
