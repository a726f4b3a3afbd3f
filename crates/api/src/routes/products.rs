//! Product catalog endpoints. Reads are public, writes need an admin.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::ProductId;
use domain::{NewProduct, Product, ProductPatch};
use services::ProductGroup;
use store::Store;

use super::{JsonBody, PathParam};
use crate::AppState;
use crate::auth::AdminUser;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/products", get(list::<S>).post(create::<S>))
        .route(
            "/products/{id}",
            get(get_one::<S>).patch(update::<S>).delete(delete::<S>),
        )
}

/// GET /products, grouped by category.
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductGroup>>, ApiError> {
    Ok(Json(state.catalog.list_products().await?))
}

/// GET /products/{id}
pub async fn get_one<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    PathParam(id): PathParam<ProductId>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.get_product(id).await?))
}

/// POST /products
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    JsonBody(input): JsonBody<NewProduct>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// PATCH /products/{id}
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<ProductId>,
    JsonBody(patch): JsonBody<ProductPatch>,
) -> Result<Json<Product>, ApiError> {
    Ok(Json(state.catalog.update_product(id, patch).await?))
}

/// DELETE /products/{id}
pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<ProductId>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
