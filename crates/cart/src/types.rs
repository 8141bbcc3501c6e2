//! Domain types for the cart engine.
//!
//! These types double as the wire format of the remote cart store, which
//! speaks camelCase JSON. The engine treats everything the store returns as
//! canonical; the only client-side state layered on top is the [`Coupon`]
//! overlay and the derived [`Summary`].

use std::collections::HashMap;

use golden_kiwi_core::define_id;
use golden_kiwi_core::types::{CurrencyCode, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

define_id!(CartId);
define_id!(LineItemId);
define_id!(ProductId);
define_id!(VariantId);

// =============================================================================
// Line Items
// =============================================================================

/// One product (plus optional variant) and its quantity within a cart.
///
/// Unit price and discount are the snapshot taken by the store when the item
/// was added; the client never recomputes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub id: LineItemId,
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<VariantId>,
    pub title: String,
    /// Positive integer; the store rejects zero.
    pub quantity: u32,
    pub unit_price: Money,
    /// Per-unit discount applied at add time.
    pub unit_discount: Money,
    /// Upper bound for quantity edits, validated client-side.
    pub available_stock: u32,
}

impl LineItem {
    /// Price for this line before discounts.
    #[must_use]
    pub fn line_subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    /// Discount for this line.
    #[must_use]
    pub fn line_discount(&self) -> Money {
        self.unit_discount.multiply(self.quantity)
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The canonical cart as returned by the remote store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: CartId,
    pub items: Vec<LineItem>,
    /// Server-computed subtotal; treated as authoritative.
    pub subtotal: Money,
}

impl Cart {
    /// The cart's currency, taken from the server subtotal.
    #[must_use]
    pub const fn currency(&self) -> CurrencyCode {
        self.subtotal.currency_code()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items.iter().map(|line| line.quantity).sum()
    }

    /// Whether the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find a line item by ID.
    #[must_use]
    pub fn line(&self, id: &LineItemId) -> Option<&LineItem> {
        self.items.iter().find(|line| &line.id == id)
    }

    /// Sum of all per-line discounts.
    #[must_use]
    pub fn item_discounts(&self) -> Money {
        let amount = self
            .items
            .iter()
            .map(|line| line.line_discount().amount())
            .sum();
        Money::new(amount, self.currency())
    }
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon's `discount_amount` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponKind {
    /// `discount_amount` is a percentage of the subtotal (e.g., 10 for 10%).
    Percentage,
    /// `discount_amount` is a fixed amount in the cart's currency.
    Fixed,
}

/// A named discount rule resolved by the remote validator.
///
/// Immutable value object; applied as a session-local overlay and never
/// persisted back to the store. Only one coupon is active at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coupon {
    pub code: String,
    #[serde(rename = "type")]
    pub kind: CouponKind,
    pub discount_amount: Decimal,
}

// =============================================================================
// Derived Summary
// =============================================================================

/// The derived set of monetary totals for a cart.
///
/// Always recomputed via [`crate::summary::compute_summary`]; never mutated
/// directly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub subtotal: Money,
    pub item_discounts: Money,
    pub coupon_discount: Money,
    pub shipping: Money,
    pub total: Money,
    pub item_count: u32,
}

impl Summary {
    /// Summary for an empty (or not yet fetched) cart.
    #[must_use]
    pub fn empty(currency: CurrencyCode) -> Self {
        let zero = Money::zero(currency);
        Self {
            subtotal: zero,
            item_discounts: zero,
            coupon_discount: zero,
            shipping: zero,
            total: zero,
            item_count: 0,
        }
    }
}

// =============================================================================
// Render-Ready View
// =============================================================================

/// Everything the UI needs to render the cart.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    pub items: Vec<LineItem>,
    pub summary: Summary,
    /// Whether a fetch is in flight.
    pub loading: bool,
    /// Per-line in-flight flags; the UI disables the matching controls.
    pub updating: HashMap<LineItemId, bool>,
}

impl CartView {
    /// View for an empty cart.
    #[must_use]
    pub fn empty(currency: CurrencyCode) -> Self {
        Self {
            items: Vec::new(),
            summary: Summary::empty(currency),
            loading: false,
            updating: HashMap::new(),
        }
    }
}
