//! Error taxonomy for cart operations.
//!
//! Every error is handled at the point of the failing operation and rendered
//! to the user; none propagate as panics. There is no retry policy - a failed
//! mutation requires a manual user retry.

use thiserror::Error;

/// Errors that can occur when operating on the cart.
#[derive(Debug, Error)]
pub enum CartError {
    /// Missing or expired bearer token. The caller must redirect to login.
    #[error("not authenticated")]
    Auth,

    /// Client-side validation failed; no store call was made.
    #[error("{0}")]
    Validation(String),

    /// Transport failure (connection refused, timeout, ...).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The store answered with a non-2xx status.
    #[error("server error ({status}): {message}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Message from the store's error body, or a synthesized one.
        message: String,
    },

    /// The coupon validator rejected the code. The message is surfaced
    /// verbatim.
    #[error("{0}")]
    CouponRejected(String),

    /// Response body could not be parsed.
    #[error("response parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

impl CartError {
    /// Whether the caller should redirect to the login page.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Auth)
    }

    /// Message suitable for a user-facing toast or inline notice.
    ///
    /// Validation and coupon messages pass through verbatim; transport and
    /// parse failures are collapsed to a generic message so internals are
    /// not exposed.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Auth => "Please sign in to continue".to_string(),
            Self::Validation(message) | Self::CouponRejected(message) => message.clone(),
            Self::Server { message, .. } => message.clone(),
            Self::Network(_) => "Network error, please try again".to_string(),
            Self::Parse(_) => "Something went wrong, please try again".to_string(),
        }
    }
}
