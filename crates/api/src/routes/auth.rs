//! Registration, login, logout and password reset.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use domain::User;
use serde::{Deserialize, Serialize};
use services::NewUser;
use store::Store;

use super::{JsonBody, MessageResponse};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/auth/register", post(register::<S>))
        .route("/auth/login", post(login::<S>))
        .route("/auth/logout", post(logout::<S>))
        .route("/auth/forgot-password", post(forgot_password::<S>))
        .route("/auth/reset-password", post(reset_password::<S>))
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub message: &'static str,
    pub token: String,
    pub user: User,
}

fn issue_token<S: Store>(state: &AppState<S>, user: &User) -> Result<String, ApiError> {
    state.tokens.issue(user.id).map_err(|e| {
        ApiError::Service(services::ServiceError::Internal(format!(
            "token issue failed: {e}"
        )))
    })
}

/// POST /auth/register
pub async fn register<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), ApiError> {
    let user = state
        .accounts
        .register(NewUser {
            name: req.name,
            email: req.email,
            password: req.password,
            role: None,
        })
        .await?;
    let token = issue_token(&state, &user)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            message: "User registered successfully",
            token,
            user,
        }),
    ))
}

/// POST /auth/login
pub async fn login<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let user = state.accounts.authenticate(&req.email, &req.password).await?;
    let token = issue_token(&state, &user)?;

    Ok(Json(AuthResponse {
        message: "Login successful",
        token,
        user,
    }))
}

/// POST /auth/logout. The presented token stops working immediately.
pub async fn logout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Json<MessageResponse> {
    state.denylist.revoke(&current.claims.jti).await;
    tracing::info!(user_id = %current.user.id, "user logged out");
    MessageResponse::new("Logged out successfully")
}

/// POST /auth/forgot-password. Answers the same whether or not the email is known.
pub async fn forgot_password<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.accounts.request_password_reset(&req.email).await?;
    Ok(MessageResponse::new(
        "If the email is registered, a password reset link has been sent",
    ))
}

/// POST /auth/reset-password
pub async fn reset_password<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    JsonBody(req): JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .accounts
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(MessageResponse::new("Password reset successful"))
}
