//! The caller's shopping cart and checkout.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use common::{CartItemId, ProductId};
use domain::{CartItem, CartView, Order};
use serde::Deserialize;
use store::Store;

use super::{JsonBody, PathParam};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/cart",
            post(add_item::<S>).get(get_cart::<S>).delete(clear::<S>),
        )
        .route(
            "/cart/items/{item_id}",
            patch(update_item::<S>).delete(remove_item::<S>),
        )
        .route("/cart/checkout", post(checkout::<S>))
}

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
}

/// POST /cart. Adding a product already in the cart sums the quantities.
pub async fn add_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<AddItemRequest>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let item = state
        .cart
        .add_item(current.user.id, req.product_id, req.quantity)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /cart with line subtotals and the total at current prices.
pub async fn get_cart<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.cart.get_cart(current.user.id).await?))
}

pub async fn update_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(item_id): PathParam<CartItemId>,
    JsonBody(req): JsonBody<UpdateItemRequest>,
) -> Result<Json<CartItem>, ApiError> {
    let item = state
        .cart
        .update_item(current.user.id, item_id, req.quantity)
        .await?;
    Ok(Json(item))
}

pub async fn remove_item<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(item_id): PathParam<CartItemId>,
) -> Result<StatusCode, ApiError> {
    state.cart.remove_item(current.user.id, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn clear<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.cart.clear(current.user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /cart/checkout
pub async fn checkout<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = state.cart.checkout(current.user.id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}
