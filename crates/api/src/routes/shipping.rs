//! Shipping records, keyed by order for customers and by shipping id for admins.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use common::{OrderId, ShippingId};
use domain::{Money, Shipping, ShippingDetails, ShippingPatch, ShippingStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use super::{JsonBody, PathParam, QueryParams};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiError;

pub fn router<S: Store>() -> Router<Arc<AppState<S>>> {
    Router::new()
        .route("/shipping", get(list_all::<S>).post(create::<S>))
        .route("/shipping/rates", get(rates::<S>))
        // One path, two meanings: GET takes a status, PATCH a shipping id.
        .route(
            "/shipping/status/{key}",
            get(list_by_status::<S>).patch(update_status::<S>),
        )
        .route(
            "/shipping/{order_id}",
            get(get_one::<S>).patch(update::<S>).delete(delete::<S>),
        )
}

#[derive(Deserialize)]
pub struct CreateShippingRequest {
    pub order_id: OrderId,
    #[serde(flatten)]
    pub details: ShippingDetails,
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
    pub tracking_number: Option<String>,
}

#[derive(Deserialize)]
pub struct RatesParams {
    #[serde(default)]
    pub city: String,
}

#[derive(Serialize)]
pub struct RateResponse {
    pub city: String,
    pub cost: Money,
}

fn parse_status(value: &str) -> Result<ShippingStatus, ApiError> {
    value
        .parse::<ShippingStatus>()
        .map_err(|e| ApiError::Service(e.into()))
}

/// POST /shipping for one of the caller's orders.
pub async fn create<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    JsonBody(req): JsonBody<CreateShippingRequest>,
) -> Result<(StatusCode, Json<Shipping>), ApiError> {
    let shipping = state
        .shipping
        .create_shipping(req.order_id, req.details, current.actor())
        .await?;
    Ok((StatusCode::CREATED, Json(shipping)))
}

pub async fn get_one<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(order_id): PathParam<OrderId>,
) -> Result<Json<Shipping>, ApiError> {
    Ok(Json(
        state
            .shipping
            .get_shipping(order_id, current.actor())
            .await?,
    ))
}

/// PATCH /shipping/{order_id}. Only while the parcel has not left.
pub async fn update<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(order_id): PathParam<OrderId>,
    JsonBody(patch): JsonBody<ShippingPatch>,
) -> Result<Json<Shipping>, ApiError> {
    Ok(Json(
        state
            .shipping
            .update_shipping_details(order_id, current.actor(), patch)
            .await?,
    ))
}

pub async fn delete<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    current: CurrentUser,
    PathParam(order_id): PathParam<OrderId>,
) -> Result<StatusCode, ApiError> {
    state
        .shipping
        .delete_shipping(order_id, current.actor())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /shipping/rates?city=
pub async fn rates<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _current: CurrentUser,
    QueryParams(params): QueryParams<RatesParams>,
) -> Result<Json<RateResponse>, ApiError> {
    let cost = state.shipping.shipping_cost(&params.city)?;
    Ok(Json(RateResponse {
        city: params.city.trim().to_string(),
        cost,
    }))
}

/// GET /shipping/status/{status}
pub async fn list_by_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(status): PathParam<String>,
) -> Result<Json<Vec<Shipping>>, ApiError> {
    let status = parse_status(&status)?;
    Ok(Json(state.shipping.list_by_status(status).await?))
}

/// PATCH /shipping/status/{shipping_id}. Advances one step along the carrier flow.
pub async fn update_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
    PathParam(shipping_id): PathParam<ShippingId>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Shipping>, ApiError> {
    let status = parse_status(&req.status)?;
    Ok(Json(
        state
            .shipping
            .update_shipping_status(shipping_id, status, req.tracking_number)
            .await?,
    ))
}

/// GET /shipping
pub async fn list_all<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminUser,
) -> Result<Json<Vec<Shipping>>, ApiError> {
    Ok(Json(state.shipping.list_all().await?))
}
