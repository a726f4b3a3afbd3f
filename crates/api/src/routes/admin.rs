//! Admin panel endpoints. Every route requires the admin role.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, patch};
use axum::{Json, Router};
use common::{OrderId, Page, PageRequest, UserId};
use domain::{Order, OrderStatus, Role, User, UserSummary};
use serde::Deserialize;
use services::DashboardStats;
use store::Store;

use super::orders::UpdateStatusRequest;
use super::{JsonBody, PathParam, QueryParams};
use crate::AppState;
use crate::auth::AdminUser;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/admin/users", get(users::<S>))
        .route("/admin/admins", get(admins::<S>))
        .route("/admin/users/{id}/role", patch(change_role::<S>))
        .route("/admin/users/{id}", delete(delete_user::<S>))
        .route("/admin/orders", get(orders::<S>))
        .route("/admin/orders/{id}/status", patch(update_order_status::<S>))
        .route("/admin/dashboard", get(dashboard::<S>))
}

#[derive(Deserialize)]
pub struct RoleRequest {
    pub role: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OrdersParams {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

pub async fn users<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.accounts.list_users().await?))
}

pub async fn admins<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<UserSummary>>, ApiError> {
    Ok(Json(state.accounts.list_admins().await?))
}

pub async fn change_role<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<UserId>,
    JsonBody(req): JsonBody<RoleRequest>,
) -> Result<Json<User>, ApiError> {
    let role: Role = req
        .role
        .parse()
        .map_err(|e: domain::DomainError| ApiError::Service(e.into()))?;
    Ok(Json(state.accounts.change_role(id, role).await?))
}

/// DELETE /admin/users/{id}. Admin accounts cannot be removed here.
pub async fn delete_user<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<UserId>,
) -> Result<StatusCode, ApiError> {
    state.accounts.admin_delete_user(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /admin/orders?status=&page=&limit=
pub async fn orders<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    QueryParams(params): QueryParams<OrdersParams>,
) -> Result<Json<Page<Order>>, ApiError> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(value) => Some(
            value
                .parse::<OrderStatus>()
                .map_err(|e| ApiError::Service(e.into()))?,
        ),
    };
    let page = PageRequest::new(params.page, params.limit);
    Ok(Json(state.orders.list_orders_page(status, page).await?))
}

pub async fn update_order_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<OrderId>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status = req.parse()?;
    Ok(Json(state.orders.update_order_status(id, status).await?))
}

/// GET /admin/dashboard: user and order counts, revenue and the latest orders.
pub async fn dashboard<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<DashboardStats>, ApiError> {
    Ok(Json(state.accounts.dashboard().await?))
}
