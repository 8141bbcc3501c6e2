//! Pure aggregate recomputation.
//!
//! `total = subtotal - item discounts - coupon discount + shipping`, clamped
//! at zero. The functions here never touch the network; the engine calls
//! them after every state change.

use golden_kiwi_core::types::Money;
use rust_decimal::Decimal;

use crate::config::PricingPolicy;
use crate::types::{Cart, Coupon, CouponKind, Summary};

/// Shipping cost for a given subtotal: free at or above the threshold,
/// otherwise the flat fee.
#[must_use]
pub fn shipping_cost(subtotal: &Money, pricing: &PricingPolicy) -> Money {
    if subtotal.amount() >= pricing.free_shipping_threshold {
        Money::zero(subtotal.currency_code())
    } else {
        Money::new(pricing.flat_shipping_fee, subtotal.currency_code())
    }
}

/// Discount a coupon grants against a subtotal.
///
/// Percentage coupons are rounded to two decimal places.
#[must_use]
pub fn coupon_discount(coupon: &Coupon, subtotal: &Money) -> Money {
    match coupon.kind {
        CouponKind::Percentage => subtotal.percent(coupon.discount_amount),
        CouponKind::Fixed => Money::new(coupon.discount_amount, subtotal.currency_code()),
    }
}

/// Derive the full summary for a cart plus an optional coupon overlay.
///
/// Empty carts ship nothing, so their shipping cost is zero regardless of
/// the threshold. The grand total never goes negative.
#[must_use]
pub fn compute_summary(cart: &Cart, coupon: Option<&Coupon>, pricing: &PricingPolicy) -> Summary {
    let currency = cart.currency();
    let subtotal = cart.subtotal;
    let item_discounts = cart.item_discounts();
    let coupon_discount =
        coupon.map_or_else(|| Money::zero(currency), |c| coupon_discount(c, &subtotal));
    let shipping = if cart.is_empty() {
        Money::zero(currency)
    } else {
        shipping_cost(&subtotal, pricing)
    };

    let total = (subtotal.amount() - item_discounts.amount() - coupon_discount.amount()
        + shipping.amount())
    .max(Decimal::ZERO);

    Summary {
        subtotal,
        item_discounts,
        coupon_discount,
        shipping,
        total: Money::new(total, currency),
        item_count: cart.item_count(),
    }
}
