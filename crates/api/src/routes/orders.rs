//! Order placement, lookup and administration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use common::{OrderId, ProductId};
use domain::{Order, OrderStatus};
use serde::Deserialize;
use store::Store;

use super::{DeletedResponse, JsonBody, PathParam};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/orders", post(create::<S>).delete(delete_all::<S>))
        .route("/orders/all", get(list_all::<S>))
        .route("/orders/my-orders", get(list_mine::<S>))
        .route("/orders/{id}", get(get_one::<S>).delete(delete::<S>))
        .route("/orders/{id}/status", patch(update_status::<S>))
        .route("/orders/{id}/cancel", post(cancel::<S>))
}

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub items: Vec<OrderLineRequest>,
}

#[derive(Deserialize)]
pub struct OrderLineRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

impl UpdateStatusRequest {
    pub fn parse(&self) -> Result<OrderStatus, ApiError> {
        self.status
            .parse::<OrderStatus>()
            .map_err(|e| ApiError::Service(e.into()))
    }
}

// -- Handlers --

/// POST /orders. Places an order directly, bypassing the cart.
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    if req.items.is_empty() {
        return Err(ApiError::BadRequest(
            "Order must contain at least one item".to_string(),
        ));
    }
    let items: Vec<(ProductId, u32)> = req
        .items
        .iter()
        .map(|line| (line.product_id, line.quantity))
        .collect();

    let order = state.orders.create_order(current.user.id, &items).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders/all
pub async fn list_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_all_orders().await?))
}

/// GET /orders/my-orders
pub async fn list_mine<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.orders.list_user_orders(current.user.id).await?))
}

/// GET /orders/{id}. Customers get 404 for orders that are not theirs.
pub async fn get_one<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<Order>, ApiError> {
    let owner = current.actor().owner_filter();
    Ok(Json(state.orders.get_order(id, owner).await?))
}

/// PATCH /orders/{id}/status
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<OrderId>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let status = req.parse()?;
    Ok(Json(state.orders.update_order_status(id, status).await?))
}

/// POST /orders/{id}/cancel. Restores stock for a pending order.
pub async fn cancel<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.orders.cancel_order(id, current.actor()).await?))
}

/// DELETE /orders/{id}
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<OrderId>,
) -> Result<StatusCode, ApiError> {
    state.orders.delete_order(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /orders
pub async fn delete_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.orders.delete_all_orders().await?;
    Ok(Json(DeletedResponse { deleted }))
}
