use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::CategoryId;
use domain::{Category, CategoryNode, Product};
use services::{CategoryPatch, NewCategory};
use store::Store;

use super::{DeletedResponse, JsonBody, PathParam};
use crate::AppState;
use crate::auth::AdminUser;
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route(
            "/categories",
            get(list::<S>).post(create::<S>).delete(delete_all::<S>),
        )
        .route(
            "/categories/{id}",
            get(get_one::<S>).patch(update::<S>).delete(delete::<S>),
        )
        .route("/categories/{id}/products", get(products::<S>))
}

/// GET /categories as a tree of root categories with their children.
pub async fn list<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<CategoryNode>>, ApiError> {
    Ok(Json(state.catalog.list_categories().await?))
}

pub async fn get_one<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    PathParam(id): PathParam<CategoryId>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.catalog.get_category(id).await?))
}

pub async fn products<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    PathParam(id): PathParam<CategoryId>,
) -> Result<Json<Vec<Product>>, ApiError> {
    Ok(Json(state.catalog.category_products(id).await?))
}

pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    JsonBody(input): JsonBody<NewCategory>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.catalog.create_category(input).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<CategoryId>,
    JsonBody(patch): JsonBody<CategoryPatch>,
) -> Result<Json<Category>, ApiError> {
    Ok(Json(state.catalog.update_category(id, patch).await?))
}

pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(id): PathParam<CategoryId>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /categories. Refused while any category still holds products.
pub async fn delete_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<DeletedResponse>, ApiError> {
    let deleted = state.catalog.delete_all_categories().await?;
    Ok(Json(DeletedResponse { deleted }))
}
