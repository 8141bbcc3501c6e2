//! Golden Kiwi Cart - cart aggregation and coupon engine.
//!
//! # Architecture
//!
//! - The remote cart store is the source of truth - NO local persistence,
//!   every mutation is followed by a full re-fetch (read-after-write)
//! - [`CartEngine`] holds the session-local view: the last known-good cart,
//!   the active coupon overlay, and per-item in-flight flags
//! - [`summary::compute_summary`] derives totals; they are never mutated
//!   directly
//! - On any remote failure the last fetched cart stays displayed
//!   (stale-but-available) instead of blanking the view
//!
//! # Example
//!
//! ```rust,ignore
//! use golden_kiwi_cart::config::CartConfig;
//! use golden_kiwi_cart::{CartEngine, HttpCartStore};
//!
//! let config = CartConfig::from_env()?;
//! let store = HttpCartStore::new(&config.store)?;
//! let engine = CartEngine::new(store, config.pricing);
//!
//! engine.refresh().await?;
//! engine.apply_coupon("SAVE10").await?;
//! let view = engine.view();
//! println!("{}", view.summary.total);
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod engine;
pub mod error;
pub mod store;
pub mod summary;
pub mod types;

pub use engine::{CartEngine, Phase};
pub use error::CartError;
pub use store::{CartStore, HttpCartStore};
