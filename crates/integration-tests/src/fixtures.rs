//! Shared fixtures for integration tests.

use golden_kiwi_cart::types::{
    Cart, CartId, Coupon, CouponKind, LineItem, LineItemId, ProductId,
};
use golden_kiwi_core::types::{CurrencyCode, Money};
use rust_decimal::Decimal;

/// Dollar amount from cents.
#[must_use]
pub fn usd(cents: i64) -> Money {
    Money::new(Decimal::new(cents, 2), CurrencyCode::USD)
}

/// A line item with no per-item discount.
#[must_use]
pub fn line(id: &str, price_cents: i64, quantity: u32, stock: u32) -> LineItem {
    LineItem {
        id: LineItemId::new(id),
        product_id: ProductId::new(format!("prod_{id}")),
        variant_id: None,
        title: format!("Product {id}"),
        quantity,
        unit_price: usd(price_cents),
        unit_discount: usd(0),
        available_stock: stock,
    }
}

/// A cart whose subtotal is derived from its lines.
#[must_use]
pub fn cart_with(items: Vec<LineItem>) -> Cart {
    let subtotal = items
        .iter()
        .map(|l| l.line_subtotal().amount())
        .sum::<Decimal>();
    Cart {
        id: CartId::new("cart_1"),
        items,
        subtotal: Money::new(subtotal, CurrencyCode::USD),
    }
}

/// The coupons the mock validator accepts: SAVE10 (10%) and FLAT15 ($15).
#[must_use]
pub fn standard_coupons() -> Vec<Coupon> {
    vec![
        Coupon {
            code: "SAVE10".to_string(),
            kind: CouponKind::Percentage,
            discount_amount: Decimal::from(10),
        },
        Coupon {
            code: "FLAT15".to_string(),
            kind: CouponKind::Fixed,
            discount_amount: Decimal::new(15_00, 2),
        },
    ]
}
