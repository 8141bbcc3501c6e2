//! Integration test harness for Golden Kiwi.
//!
//! Provides an in-process axum mock of the remote cart store so the cart
//! engine can be exercised over real HTTP: the five REST endpoints, bearer
//! token enforcement, stock limits, and coupon validation.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p golden-kiwi-integration-tests
//! ```

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use golden_kiwi_cart::config::StoreConfig;
use golden_kiwi_cart::types::{Cart, Coupon};
use golden_kiwi_core::types::Money;
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use serde_json::json;
use url::Url;

pub mod fixtures;

/// Bearer token the mock store accepts.
pub const TEST_TOKEN: &str = "kiwi-test-token";

/// Initialize tracing once for the whole test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "golden_kiwi_cart=debug".into());
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}

/// Mutable state behind the mock store.
pub struct MockState {
    pub cart: Cart,
    pub coupons: HashMap<String, Coupon>,
    /// Number of requests that passed authentication.
    pub hits: usize,
    /// Artificial delay before answering, for timeout tests.
    pub delay: Option<Duration>,
}

type SharedState = Arc<Mutex<MockState>>;

/// An in-process mock of the remote cart store.
pub struct MockStore {
    addr: SocketAddr,
    state: SharedState,
}

impl MockStore {
    /// Spawn the mock store on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if the listener cannot be bound (test environment error).
    pub async fn spawn(cart: Cart, coupons: Vec<Coupon>) -> Self {
        let state: SharedState = Arc::new(Mutex::new(MockState {
            cart,
            coupons: coupons.into_iter().map(|c| (c.code.clone(), c)).collect(),
            hits: 0,
            delay: None,
        }));

        let router = Router::new()
            .route("/cart", get(get_cart))
            .route("/cart/update/{item_id}", put(update_item))
            .route("/cart/remove/{item_id}", delete(remove_item))
            .route("/cart/clear", delete(clear_cart))
            .route("/cart/apply-coupon", post(apply_coupon))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind mock store listener");
        let addr = listener.local_addr().expect("listener has no local addr");

        tokio::spawn(async move {
            axum::serve(listener, router)
                .await
                .expect("mock store crashed");
        });

        Self { addr, state }
    }

    /// Base URL of the running mock.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Store config pointing at the mock, with the given token.
    ///
    /// # Panics
    ///
    /// Panics if the base URL does not parse (cannot happen for a bound
    /// socket address).
    #[must_use]
    pub fn store_config(&self, token: Option<&str>) -> StoreConfig {
        StoreConfig {
            base_url: Url::parse(&self.base_url()).expect("mock base url"),
            bearer_token: token.map(SecretString::from),
            timeout: Duration::from_secs(5),
        }
    }

    /// Number of authenticated requests served so far.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.state.lock().expect("mock state poisoned").hits
    }

    /// Make every subsequent response wait first.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().expect("mock state poisoned").delay = Some(delay);
    }

    /// Snapshot of the server-side cart.
    ///
    /// # Panics
    ///
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn cart(&self) -> Cart {
        self.state.lock().expect("mock state poisoned").cart.clone()
    }
}

// =============================================================================
// Handlers
// =============================================================================

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Authentication required"})),
    )
        .into_response()
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

fn authorize(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TEST_TOKEN}"))
}

async fn pause(state: &SharedState) {
    let delay = state.lock().expect("mock state poisoned").delay;
    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
}

fn recompute_subtotal(cart: &mut Cart) {
    let currency = cart.currency();
    let subtotal = cart
        .items
        .iter()
        .map(|l| l.line_subtotal().amount())
        .sum::<Decimal>();
    cart.subtotal = Money::new(subtotal, currency);
}

async fn get_cart(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    pause(&state).await;
    if !authorize(&headers) {
        return unauthorized();
    }
    let mut s = state.lock().expect("mock state poisoned");
    s.hits += 1;
    Json(s.cart.clone()).into_response()
}

#[derive(Debug, Deserialize)]
struct UpdateItemBody {
    quantity: u32,
}

async fn update_item(
    State(state): State<SharedState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateItemBody>,
) -> Response {
    pause(&state).await;
    if !authorize(&headers) {
        return unauthorized();
    }
    let mut s = state.lock().expect("mock state poisoned");
    s.hits += 1;

    let Some(item) = s.cart.items.iter_mut().find(|l| l.id.as_str() == item_id) else {
        return error_body(StatusCode::NOT_FOUND, "Item not found");
    };
    if body.quantity > item.available_stock {
        return error_body(StatusCode::UNPROCESSABLE_ENTITY, "Insufficient stock");
    }
    item.quantity = body.quantity;
    recompute_subtotal(&mut s.cart);
    Json(s.cart.clone()).into_response()
}

async fn remove_item(
    State(state): State<SharedState>,
    Path(item_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    pause(&state).await;
    if !authorize(&headers) {
        return unauthorized();
    }
    let mut s = state.lock().expect("mock state poisoned");
    s.hits += 1;

    let before = s.cart.items.len();
    s.cart.items.retain(|l| l.id.as_str() != item_id);
    if s.cart.items.len() == before {
        return error_body(StatusCode::NOT_FOUND, "Item not found");
    }
    recompute_subtotal(&mut s.cart);
    Json(s.cart.clone()).into_response()
}

async fn clear_cart(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    pause(&state).await;
    if !authorize(&headers) {
        return unauthorized();
    }
    let mut s = state.lock().expect("mock state poisoned");
    s.hits += 1;

    s.cart.items.clear();
    recompute_subtotal(&mut s.cart);
    Json(s.cart.clone()).into_response()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyCouponBody {
    coupon_code: String,
}

async fn apply_coupon(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ApplyCouponBody>,
) -> Response {
    pause(&state).await;
    if !authorize(&headers) {
        return unauthorized();
    }
    let mut s = state.lock().expect("mock state poisoned");
    s.hits += 1;

    s.coupons.get(&body.coupon_code).map_or_else(
        || error_body(StatusCode::BAD_REQUEST, "Invalid coupon code"),
        |coupon| Json(coupon.clone()).into_response(),
    )
}
