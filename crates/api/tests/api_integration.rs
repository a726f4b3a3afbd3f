//! Integration tests for the API server.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use domain::{PaymentMethod, PaymentOutcome, Role};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use services::payments::InMemoryGateway;
use services::{NewUser, PaymentGateways};
use store::InMemoryStore;
use tower::ServiceExt;
use uuid::Uuid;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn test_config() -> Config {
    let vars: HashMap<&str, &str> = [("AUTH_TOKEN_SECRET", "api-test-secret-0123456789abcdefghij")]
        .into_iter()
        .collect();
    Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
}

struct Harness {
    app: Router,
    state: Arc<AppState<InMemoryStore>>,
    pesapal: InMemoryGateway,
}

fn setup() -> Harness {
    let pesapal = InMemoryGateway::new(PaymentMethod::Pesapal);
    let gateways = PaymentGateways {
        pesapal: Arc::new(pesapal.clone()),
        mpesa: Arc::new(InMemoryGateway::new(PaymentMethod::Mpesa)),
    };
    let state = api::create_state(InMemoryStore::new(), gateways, &test_config());
    let app = api::create_app(state.clone(), get_metrics_handle());
    Harness {
        app,
        state,
        pesapal,
    }
}

impl Harness {
    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Registers a customer through the API and returns the bearer token.
    async fn customer(&self) -> String {
        let email = format!("{}@example.com", Uuid::new_v4().simple());
        let (status, body) = self
            .send(
                "POST",
                "/auth/register",
                None,
                Some(json!({ "name": "Wanjiru Kamau", "email": email, "password": "supersecret" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["token"].as_str().unwrap().to_string()
    }

    async fn admin(&self) -> String {
        let email = format!("admin-{}@example.com", Uuid::new_v4().simple());
        self.state
            .accounts
            .create_user(NewUser {
                name: "Shop Admin".to_string(),
                email: email.clone(),
                password: "adminpass".to_string(),
                role: Some(Role::Admin),
            })
            .await
            .unwrap();
        let (status, body) = self
            .send(
                "POST",
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": "adminpass" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    /// Creates a category and a product through the admin endpoints.
    async fn product(&self, admin: &str, stock: u32, price_cents: i64) -> String {
        let (status, category) = self
            .send(
                "POST",
                "/categories",
                Some(admin),
                Some(json!({ "name": format!("Category {}", Uuid::new_v4().simple()) })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, product) = self
            .send(
                "POST",
                "/products",
                Some(admin),
                Some(json!({
                    "name": "Maasai shuka",
                    "description": "Checked cotton blanket",
                    "price": price_cents,
                    "image_url": "https://img.example.com/shuka.jpg",
                    "stock": stock,
                    "category_id": category["id"],
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        product["id"].as_str().unwrap().to_string()
    }

    async fn checkout(&self, token: &str, product_id: &str, quantity: u32) -> Value {
        let (status, _) = self
            .send(
                "POST",
                "/cart",
                Some(token),
                Some(json!({ "product_id": product_id, "quantity": quantity })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, order) = self.send("POST", "/cart/checkout", Some(token), None).await;
        assert_eq!(status, StatusCode::CREATED);
        order
    }
}

#[tokio::test]
async fn test_health_check() {
    let harness = setup();

    let (status, body) = harness.send("GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let harness = setup();

    let response = harness
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap();
    assert!(content_type.starts_with("text/plain"));
}

#[tokio::test]
async fn test_protected_routes_require_a_token() {
    let harness = setup();

    let (status, body) = harness.send("GET", "/cart", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());

    let (status, _) = harness.send("GET", "/cart", Some("garbage.token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_customers_cannot_use_admin_routes() {
    let harness = setup();
    let token = harness.customer().await;

    let (status, _) = harness.send("GET", "/orders/all", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = harness
        .send("GET", "/admin/dashboard", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_logout_revokes_the_token() {
    let harness = setup();
    let token = harness.customer().await;

    let (status, _) = harness.send("GET", "/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .send("POST", "/auth/logout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Logged out successfully");

    let (status, body) = harness.send("GET", "/cart", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Token has been revoked");
}

#[tokio::test]
async fn test_login_with_wrong_password() {
    let harness = setup();
    harness.customer().await;

    let (status, body) = harness
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": "whatever1" })),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("Invalid email or password"));
}

#[tokio::test]
async fn test_forgot_password_does_not_reveal_accounts() {
    let harness = setup();

    let (status, body) = harness
        .send(
            "POST",
            "/auth/forgot-password",
            None,
            Some(json!({ "email": "unknown@example.com" })),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_purchase_flow_with_replayed_webhook() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 5, 2_500).await;

    let order = harness.checkout(&customer, &product_id, 2).await;
    assert_eq!(order["total"], 5_000);
    assert_eq!(order["status"], "pending");

    let (_, product) = harness
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(product["stock"], 3);

    let (status, initiation) = harness
        .send(
            "POST",
            "/payments/initiate",
            Some(&customer),
            Some(json!({ "order_id": order["id"], "phone": "0722000111" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(initiation["redirect_url"].is_string());
    let tracking_id = initiation["transaction_id"].as_str().unwrap().to_string();
    assert_eq!(harness.pesapal.last_reference(), Some(tracking_id.clone()));

    let notification = json!({ "OrderTrackingId": tracking_id, "OrderNotificationType": "IPNCHANGE" });
    let (status, receipt) = harness
        .send("POST", "/payments/webhook", None, Some(notification.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["updated"], false);
    assert_eq!(receipt["order_status"], "pending");

    harness.pesapal.set_outcome(&tracking_id, PaymentOutcome::Completed);
    let (status, receipt) = harness
        .send("POST", "/payments/webhook", None, Some(notification.clone()))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(receipt["updated"], true);
    assert_eq!(receipt["order_status"], "paid");

    let (status, replay) = harness
        .send("POST", "/payments/webhook", None, Some(notification))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["updated"], false);
    assert_eq!(replay["payment_status"], "completed");

    let (status, view) = harness
        .send(
            "GET",
            &format!("/payments/status/{}", order["id"].as_str().unwrap()),
            Some(&customer),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["order_status"], "paid");
    assert_eq!(view["payment"]["status"], "completed");

    let (_, cart) = harness.send("GET", "/cart", Some(&customer), None).await;
    assert_eq!(cart["items"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_oversell_is_a_conflict() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 1, 900).await;

    let (status, body) = harness
        .send(
            "POST",
            "/orders",
            Some(&customer),
            Some(json!({ "items": [{ "product_id": product_id, "quantity": 2 }] })),
        )
        .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("Insufficient stock"));
}

#[tokio::test]
async fn test_cancel_restores_stock_and_hides_foreign_orders() {
    let harness = setup();
    let admin = harness.admin().await;
    let owner = harness.customer().await;
    let stranger = harness.customer().await;
    let product_id = harness.product(&admin, 4, 1_000).await;

    let order = harness.checkout(&owner, &product_id, 3).await;
    let cancel_uri = format!("/orders/{}/cancel", order["id"].as_str().unwrap());

    let (status, _) = harness.send("POST", &cancel_uri, Some(&stranger), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, cancelled) = harness.send("POST", &cancel_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "cancelled");

    let (_, product) = harness
        .send("GET", &format!("/products/{product_id}"), None, None)
        .await;
    assert_eq!(product["stock"], 4);

    let (status, _) = harness.send("POST", &cancel_uri, Some(&owner), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_gateway_failure_records_nothing() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 2, 1_500).await;
    let order = harness.checkout(&customer, &product_id, 1).await;
    harness.pesapal.set_fail_on_initiate(true);

    let (status, _) = harness
        .send(
            "POST",
            "/payments/initiate",
            Some(&customer),
            Some(json!({ "order_id": order["id"], "phone": "0722000111" })),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let (_, payments) = harness.send("GET", "/payments/all", Some(&admin), None).await;
    assert_eq!(payments.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_mpesa_callback_is_acknowledged() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 2, 1_050).await;
    let order = harness.checkout(&customer, &product_id, 1).await;

    let (status, initiation) = harness
        .send(
            "POST",
            "/payments/mpesa/initiate",
            Some(&customer),
            Some(json!({ "order_id": order["id"], "phone": "+254 722 000 111" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(initiation["customer_message"].is_string());

    let callback = json!({
        "Body": {
            "stkCallback": {
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": initiation["transaction_id"],
                "ResultCode": 1032,
                "ResultDesc": "Request cancelled by user"
            }
        }
    });
    let (status, ack) = harness
        .send("POST", "/payments/mpesa/callback", None, Some(callback))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["ResultCode"], 0);

    let (_, fetched) = harness
        .send(
            "GET",
            &format!("/orders/{}", order["id"].as_str().unwrap()),
            Some(&customer),
            None,
        )
        .await;
    assert_eq!(fetched["status"], "payment_failed");
}

#[tokio::test]
async fn test_unknown_webhook_reference_is_not_found() {
    let harness = setup();

    let (status, _) = harness
        .send(
            "POST",
            "/payments/webhook",
            None,
            Some(json!({ "OrderTrackingId": "does-not-exist" })),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_input_is_a_bad_request() {
    let harness = setup();
    let token = harness.customer().await;

    let (status, body) = harness
        .send("GET", "/orders/not-a-uuid", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = harness
        .send("GET", "/search?sortBy=cheapest", None, None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .send("POST", "/cart/checkout", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_search_and_filters() {
    let harness = setup();
    let admin = harness.admin().await;
    harness.product(&admin, 0, 4_000).await;
    harness.product(&admin, 3, 1_000).await;

    let (status, page) = harness
        .send("GET", "/search?q=shuka&inStock=true&sortBy=price_asc", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["price"], 1_000);

    let (status, filters) = harness.send("GET", "/search/filters", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(filters["categories"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_admin_dashboard_and_order_paging() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 10, 700).await;
    harness.checkout(&customer, &product_id, 1).await;
    harness.checkout(&customer, &product_id, 2).await;

    let (status, stats) = harness
        .send("GET", "/admin/dashboard", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_orders"], 2);
    assert_eq!(stats["total_users"], 2);

    let (status, page) = harness
        .send(
            "GET",
            "/admin/orders?status=pending&page=1&limit=1",
            Some(&admin),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 2);
    assert_eq!(page["items"].as_array().unwrap().len(), 1);
    assert_eq!(page["has_next_page"], true);
}

#[tokio::test]
async fn test_shipping_lifecycle() {
    let harness = setup();
    let admin = harness.admin().await;
    let customer = harness.customer().await;
    let product_id = harness.product(&admin, 3, 2_000).await;
    let order = harness.checkout(&customer, &product_id, 1).await;
    let order_id = order["id"].as_str().unwrap().to_string();

    let (status, shipping) = harness
        .send(
            "POST",
            "/shipping",
            Some(&customer),
            Some(json!({
                "order_id": order_id,
                "address": "Moi Avenue 12",
                "city": "Mombasa",
                "postal_code": "80100",
                "phone": "0722000111"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(shipping["status"], "pending");
    let shipping_id = shipping["id"].as_str().unwrap().to_string();

    let (status, _) = harness
        .send(
            "PATCH",
            &format!("/shipping/status/{shipping_id}"),
            Some(&admin),
            Some(json!({ "status": "delivered" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, shipped) = harness
        .send(
            "PATCH",
            &format!("/shipping/status/{shipping_id}"),
            Some(&admin),
            Some(json!({ "status": "shipped", "tracking_number": "KE-42" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["status"], "shipped");
    assert_eq!(shipped["tracking_number"], "KE-42");

    let (status, listed) = harness
        .send("GET", "/shipping/status/shipped", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = harness
        .send(
            "PATCH",
            &format!("/shipping/{order_id}"),
            Some(&customer),
            Some(json!({ "city": "Kisumu" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}
