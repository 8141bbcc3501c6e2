//! Core types for Golden Kiwi.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod id;
pub mod money;

pub use money::{CurrencyCode, Money, MoneyError, ParseCurrencyError};
