//! Remote cart store client.
//!
//! The store is the single source of truth for line items. Responses to
//! mutations are deliberately discarded: the engine always re-fetches the
//! canonical cart afterwards, so nothing here is cached.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::instrument;

use crate::config::StoreConfig;
use crate::error::CartError;
use crate::types::{Cart, Coupon, LineItemId};

/// Operations the remote cart store must provide.
///
/// Mutations return `()` on purpose - the engine's read-after-write policy
/// means the follow-up fetch is the only response body that matters.
#[allow(async_fn_in_trait)]
pub trait CartStore {
    /// Fetch the canonical cart.
    async fn fetch_cart(&self) -> Result<Cart, CartError>;

    /// Set the quantity of one line item.
    async fn update_quantity(&self, line_id: &LineItemId, quantity: u32) -> Result<(), CartError>;

    /// Remove one line item.
    async fn remove_line(&self, line_id: &LineItemId) -> Result<(), CartError>;

    /// Remove every line item.
    async fn clear(&self) -> Result<(), CartError>;

    /// Resolve a coupon code to its discount terms.
    async fn validate_coupon(&self, code: &str) -> Result<Coupon, CartError>;
}

// =============================================================================
// Wire Payloads
// =============================================================================

#[derive(Debug, Serialize)]
struct UpdateQuantityBody {
    quantity: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApplyCouponBody<'a> {
    coupon_code: &'a str,
}

#[derive(Debug, serde::Deserialize)]
struct ApiErrorBody {
    message: String,
}

// =============================================================================
// HttpCartStore
// =============================================================================

/// HTTP client for the remote cart store.
///
/// Speaks the store's REST contract:
/// - `GET /cart`
/// - `PUT /cart/update/:itemId` with `{quantity}`
/// - `DELETE /cart/remove/:itemId`
/// - `DELETE /cart/clear`
/// - `POST /cart/apply-coupon` with `{couponCode}`
#[derive(Clone)]
pub struct HttpCartStore {
    inner: Arc<HttpCartStoreInner>,
}

struct HttpCartStoreInner {
    client: reqwest::Client,
    base: String,
    token: Option<SecretString>,
}

impl HttpCartStore {
    /// Create a new store client.
    ///
    /// The configured timeout applies to every request, so a hung call fails
    /// with a network error instead of blocking its control forever.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, CartError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpCartStoreInner {
                client,
                base: config.base_url.as_str().trim_end_matches('/').to_string(),
                token: config.bearer_token.clone(),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.inner.base)
    }

    /// Attach the bearer token, send, and map error statuses.
    async fn send(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, CartError> {
        let token = self.inner.token.as_ref().ok_or(CartError::Auth)?;

        let response = request.bearer_auth(token.expose_secret()).send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CartError::Auth);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map_or_else(|_| format!("HTTP {status}"), |b| b.message);
            tracing::warn!(status = %status, message = %message, "cart store returned an error");
            return Err(CartError::Server {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    /// Read the response body as text first for better error diagnostics.
    async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CartError> {
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %text.chars().take(500).collect::<String>(),
                "failed to parse cart store response"
            );
            CartError::Parse(e)
        })
    }
}

impl CartStore for HttpCartStore {
    #[instrument(skip(self))]
    async fn fetch_cart(&self) -> Result<Cart, CartError> {
        let request = self.inner.client.get(self.endpoint("/cart"));
        let response = self.send(request).await?;
        Self::parse(response).await
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn update_quantity(&self, line_id: &LineItemId, quantity: u32) -> Result<(), CartError> {
        let request = self
            .inner
            .client
            .put(self.endpoint(&format!("/cart/update/{line_id}")))
            .json(&UpdateQuantityBody { quantity });
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(line_id = %line_id))]
    async fn remove_line(&self, line_id: &LineItemId) -> Result<(), CartError> {
        let request = self
            .inner
            .client
            .delete(self.endpoint(&format!("/cart/remove/{line_id}")));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<(), CartError> {
        let request = self.inner.client.delete(self.endpoint("/cart/clear"));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(code = %code))]
    async fn validate_coupon(&self, code: &str) -> Result<Coupon, CartError> {
        let request = self
            .inner
            .client
            .post(self.endpoint("/cart/apply-coupon"))
            .json(&ApplyCouponBody { coupon_code: code });

        // A 4xx from the validator is a rejection; its message passes
        // through verbatim. 401 and 5xx keep their usual meaning.
        let response = match self.send(request).await {
            Ok(response) => response,
            Err(CartError::Server { status, message }) if (400..500).contains(&status) => {
                return Err(CartError::CouponRejected(message));
            }
            Err(e) => return Err(e),
        };

        Self::parse(response).await
    }
}
