//! HTTP API server with observability for the storefront backend.
//!
//! Provides REST endpoints for the catalog, carts, orders, payments and
//! shipping, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use domain::PaymentMethod;
use metrics_exporter_prometheus::PrometheusHandle;
use services::payments::{
    DisabledGateway, GatewayError, MpesaClient, PaymentGateway, PesapalClient,
};
use services::{
    AccountService, CartService, CatalogService, LogNotifier, OrderService, PaymentGateways,
    PaymentService, SearchService, ShippingService,
};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::{TokenDenylist, TokenIssuer};
use config::Config;

/// Shared state for all handlers.
pub struct AppState<S: Store> {
    pub store: S,
    pub accounts: AccountService<S>,
    pub catalog: CatalogService<S>,
    pub cart: CartService<S>,
    pub orders: OrderService<S>,
    pub payments: PaymentService<S>,
    pub search: SearchService<S>,
    pub shipping: ShippingService<S>,
    pub tokens: TokenIssuer,
    pub denylist: TokenDenylist,
}

/// Wires every service over one store.
pub fn create_state<S: Store>(store: S, gateways: PaymentGateways, config: &Config) -> Arc<AppState<S>> {
    Arc::new(AppState {
        accounts: AccountService::new(store.clone(), Arc::new(LogNotifier)),
        catalog: CatalogService::new(store.clone()),
        cart: CartService::new(store.clone()),
        orders: OrderService::new(store.clone()),
        payments: PaymentService::new(store.clone(), gateways, config.gateway_timeout),
        search: SearchService::new(store.clone()),
        shipping: ShippingService::new(store.clone()),
        tokens: TokenIssuer::new(config.token_secret.clone(), config.token_ttl),
        denylist: TokenDenylist::new(config.token_ttl),
        store,
    })
}

/// Builds the provider clients. A provider without credentials rejects payments.
pub fn gateways_from_config(config: &Config) -> Result<PaymentGateways, GatewayError> {
    let pesapal: Arc<dyn PaymentGateway> = match &config.pesapal {
        Some(pesapal) => Arc::new(PesapalClient::new(pesapal.clone(), config.gateway_timeout)?),
        None => {
            tracing::warn!("Pesapal credentials not set, Pesapal payments disabled");
            Arc::new(DisabledGateway(PaymentMethod::Pesapal))
        }
    };
    let mpesa: Arc<dyn PaymentGateway> = match &config.mpesa {
        Some(mpesa) => Arc::new(MpesaClient::new(mpesa.clone(), config.gateway_timeout)?),
        None => {
            tracing::warn!("M-Pesa credentials not set, M-Pesa payments disabled");
            Arc::new(DisabledGateway(PaymentMethod::Mpesa))
        }
    };
    Ok(PaymentGateways { pesapal, mpesa })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store>(state: Arc<AppState<S>>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .merge(routes::auth::router::<S>())
        .merge(routes::products::router::<S>())
        .merge(routes::categories::router::<S>())
        .merge(routes::search::router::<S>())
        .merge(routes::cart::router::<S>())
        .merge(routes::orders::router::<S>())
        .merge(routes::payments::router::<S>())
        .merge(routes::shipping::router::<S>())
        .merge(routes::users::router::<S>())
        .merge(routes::admin::router::<S>())
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
