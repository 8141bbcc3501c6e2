//! Golden Kiwi Core - Shared types library.
//!
//! This crate provides common types used across all Golden Kiwi components:
//! - `cart` - Cart aggregation and coupon engine
//! - `integration-tests` - End-to-end tests against a mock cart store
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no HTTP clients.
//! This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Money with decimal arithmetic and newtype wrappers for
//!   type-safe IDs

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
