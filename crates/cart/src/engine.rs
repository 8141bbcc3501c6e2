//! Session-scoped cart engine.
//!
//! Keeps the UI's view of "what will be charged" consistent with
//! server-confirmed line items, and layers an optional coupon discount on
//! top. All collaborators are injected explicitly - the engine owns its
//! store handle and pricing policy instead of reaching for ambient state.
//!
//! # State machine
//!
//! `Idle -> Loading -> {Ready | Error}` per fetch; every mutation funnels
//! back through `Loading` via the read-after-write re-fetch. On failure the
//! last known-good cart stays displayed (stale-but-available).
//!
//! # Concurrency
//!
//! Operations take `&self`; mutable state lives behind a mutex held only
//! for synchronous sections, never across a store call. Edits to different
//! lines may therefore run concurrently, while a duplicate submission for a
//! line whose call is still in flight is ignored. Coupon validation is
//! single-flight the same way.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::instrument;

use crate::config::PricingPolicy;
use crate::error::CartError;
use crate::store::CartStore;
use crate::summary::compute_summary;
use crate::types::{Cart, CartView, Coupon, LineItemId};

/// Fetch lifecycle of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Nothing fetched yet.
    #[default]
    Idle,
    /// A fetch is in flight.
    Loading,
    /// The displayed cart matches the last successful fetch.
    Ready,
    /// The last operation failed; the displayed cart may be stale.
    Error,
}

struct EngineState {
    phase: Phase,
    cart: Option<Cart>,
    coupon: Option<Coupon>,
    updating: HashSet<LineItemId>,
    coupon_pending: bool,
}

/// Cart aggregation and coupon engine.
///
/// One engine per session. The coupon overlay lives exactly as long as the
/// engine does: it is re-applied to every freshly fetched cart but never
/// persisted to the store.
pub struct CartEngine<S> {
    store: S,
    pricing: PricingPolicy,
    state: Mutex<EngineState>,
}

impl<S: CartStore> CartEngine<S> {
    /// Create an engine with no cart loaded yet.
    pub fn new(store: S, pricing: PricingPolicy) -> Self {
        Self {
            store,
            pricing,
            state: Mutex::new(EngineState {
                phase: Phase::Idle,
                cart: None,
                coupon: None,
                updating: HashSet::new(),
                coupon_pending: false,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        // The state is plain data; a panic while holding the lock cannot
        // leave it logically broken, so poisoning is ignored.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current fetch phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Last successfully fetched cart, if any.
    #[must_use]
    pub fn cart(&self) -> Option<Cart> {
        self.state().cart.clone()
    }

    /// The active coupon overlay, if any.
    #[must_use]
    pub fn coupon(&self) -> Option<Coupon> {
        self.state().coupon.clone()
    }

    /// Whether a mutation for this line is in flight.
    #[must_use]
    pub fn is_updating(&self, line_id: &LineItemId) -> bool {
        self.state().updating.contains(line_id)
    }

    /// Fetch the canonical cart from the store.
    ///
    /// # Errors
    ///
    /// `CartError::Auth` when the session has no valid token - the caller
    /// must redirect to login. Any other failure keeps the previously
    /// displayed cart.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<(), CartError> {
        self.state().phase = Phase::Loading;
        match self.store.fetch_cart().await {
            Ok(cart) => {
                let mut state = self.state();
                state.cart = Some(cart);
                state.phase = Phase::Ready;
                Ok(())
            }
            Err(e) => {
                // Keep the stale cart visible.
                self.state().phase = Phase::Error;
                Err(e)
            }
        }
    }

    /// Set the quantity of one line item, then re-fetch the cart.
    ///
    /// A quantity of zero is a silent no-op; a quantity above the item's
    /// available stock fails validation. Neither reaches the store. While a
    /// call for this line is in flight, further calls for the same line are
    /// ignored; other lines may update concurrently.
    ///
    /// # Errors
    ///
    /// `CartError::Validation` when the quantity exceeds available stock;
    /// otherwise whatever the store or the follow-up fetch returns.
    #[instrument(skip(self), fields(line_id = %line_id, quantity))]
    pub async fn set_quantity(&self, line_id: &LineItemId, quantity: u32) -> Result<(), CartError> {
        if quantity == 0 {
            return Ok(());
        }
        {
            let mut state = self.state();
            if state.updating.contains(line_id) {
                return Ok(());
            }
            if let Some(line) = state.cart.as_ref().and_then(|cart| cart.line(line_id))
                && quantity > line.available_stock
            {
                return Err(CartError::Validation(format!(
                    "Only {} of \"{}\" available",
                    line.available_stock, line.title
                )));
            }
            state.updating.insert(line_id.clone());
        }

        let result = match self.store.update_quantity(line_id, quantity).await {
            Ok(()) => self.refresh().await,
            Err(e) => {
                self.state().phase = Phase::Error;
                Err(e)
            }
        };
        // Always re-enable the control, including after timeouts.
        self.state().updating.remove(line_id);
        result
    }

    /// Remove one line item, then re-fetch the cart. No undo.
    ///
    /// # Errors
    ///
    /// Returns the store's error (e.g., a server error for an unknown line);
    /// the displayed cart is left unchanged.
    #[instrument(skip(self), fields(line_id = %line_id))]
    pub async fn remove_line_item(&self, line_id: &LineItemId) -> Result<(), CartError> {
        {
            let mut state = self.state();
            if state.updating.contains(line_id) {
                return Ok(());
            }
            state.updating.insert(line_id.clone());
        }

        let result = match self.store.remove_line(line_id).await {
            Ok(()) => self.refresh().await,
            Err(e) => {
                self.state().phase = Phase::Error;
                Err(e)
            }
        };
        self.state().updating.remove(line_id);
        result
    }

    /// Empty the cart, gated on an explicit confirmation.
    ///
    /// When `confirm` returns `false`, nothing is sent to the store and the
    /// item list is unchanged.
    ///
    /// # Errors
    ///
    /// Returns the store's error; the displayed cart is left unchanged.
    #[instrument(skip(self, confirm))]
    pub async fn clear(&self, confirm: impl FnOnce() -> bool) -> Result<(), CartError> {
        if !confirm() {
            return Ok(());
        }

        match self.store.clear().await {
            Ok(()) => self.refresh().await,
            Err(e) => {
                self.state().phase = Phase::Error;
                Err(e)
            }
        }
    }

    /// Validate a coupon code and apply it as the session's overlay.
    ///
    /// Blank codes fail validation without a network call. Only one
    /// validation may be outstanding at a time - further calls are ignored
    /// until it settles. On success the new coupon replaces any prior one.
    ///
    /// # Errors
    ///
    /// `CartError::Validation` for a blank code, `CartError::CouponRejected`
    /// with the validator's message verbatim, or a transport/auth error.
    #[instrument(skip(self), fields(code = %code))]
    pub async fn apply_coupon(&self, code: &str) -> Result<(), CartError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(CartError::Validation(
                "Please enter a coupon code".to_string(),
            ));
        }
        {
            let mut state = self.state();
            if state.coupon_pending {
                return Ok(());
            }
            state.coupon_pending = true;
        }

        let result = self.store.validate_coupon(code).await;

        let mut state = self.state();
        state.coupon_pending = false;
        match result {
            Ok(coupon) => {
                state.coupon = Some(coupon);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop the coupon overlay; totals revert to the server subtotal.
    pub fn remove_coupon(&self) {
        self.state().coupon = None;
    }

    /// Render-ready view of the current state.
    #[must_use]
    pub fn view(&self) -> CartView {
        let state = self.state();
        let loading = state.phase == Phase::Loading;
        let updating: HashMap<LineItemId, bool> = state
            .updating
            .iter()
            .map(|id| (id.clone(), true))
            .collect();

        state.cart.as_ref().map_or_else(
            || CartView {
                loading,
                ..CartView::empty(self.pricing.currency)
            },
            |cart| CartView {
                items: cart.items.clone(),
                summary: compute_summary(cart, state.coupon.as_ref(), &self.pricing),
                loading,
                updating,
            },
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    use golden_kiwi_core::types::{CurrencyCode, Money};
    use rust_decimal::Decimal;

    use super::*;
    use crate::types::{CartId, CouponKind, LineItem, ProductId};

    fn usd(cents: i64) -> Money {
        Money::new(Decimal::new(cents, 2), CurrencyCode::USD)
    }

    fn line(id: &str, price_cents: i64, quantity: u32, stock: u32) -> LineItem {
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

    fn cart_with(items: Vec<LineItem>) -> Cart {
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

    /// In-memory store that mimics the remote contract, including
    /// stock enforcement and unknown-item errors. Mutations and coupon
    /// validation yield once before touching state so overlapping calls
    /// interleave deterministically under a single-threaded runtime.
    struct FakeStore {
        cart: Rc<RefCell<Cart>>,
        coupons: HashMap<String, Coupon>,
        calls: Rc<RefCell<Vec<&'static str>>>,
        fail_next_update: Cell<bool>,
    }

    impl FakeStore {
        fn new(cart: Cart) -> Self {
            let mut coupons = HashMap::new();
            coupons.insert(
                "SAVE10".to_string(),
                Coupon {
                    code: "SAVE10".to_string(),
                    kind: CouponKind::Percentage,
                    discount_amount: Decimal::from(10),
                },
            );
            coupons.insert(
                "FLAT15".to_string(),
                Coupon {
                    code: "FLAT15".to_string(),
                    kind: CouponKind::Fixed,
                    discount_amount: Decimal::new(15_00, 2),
                },
            );
            Self {
                cart: Rc::new(RefCell::new(cart)),
                coupons,
                calls: Rc::new(RefCell::new(Vec::new())),
                fail_next_update: Cell::new(false),
            }
        }

        fn recompute_subtotal(cart: &mut Cart) {
            let subtotal = cart
                .items
                .iter()
                .map(|l| l.line_subtotal().amount())
                .sum::<Decimal>();
            cart.subtotal = Money::new(subtotal, CurrencyCode::USD);
        }

        fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }

        fn calls_named(&self, name: &str) -> usize {
            self.calls.borrow().iter().filter(|c| **c == name).count()
        }
    }

    impl CartStore for &FakeStore {
        async fn fetch_cart(&self) -> Result<Cart, CartError> {
            self.calls.borrow_mut().push("fetch");
            Ok(self.cart.borrow().clone())
        }

        async fn update_quantity(
            &self,
            line_id: &LineItemId,
            quantity: u32,
        ) -> Result<(), CartError> {
            tokio::task::yield_now().await;
            self.calls.borrow_mut().push("update");
            if self.fail_next_update.replace(false) {
                return Err(CartError::Server {
                    status: 500,
                    message: "store exploded".to_string(),
                });
            }
            let mut cart = self.cart.borrow_mut();
            let Some(item) = cart.items.iter_mut().find(|l| &l.id == line_id) else {
                return Err(CartError::Server {
                    status: 404,
                    message: "Item not found".to_string(),
                });
            };
            item.quantity = quantity;
            FakeStore::recompute_subtotal(&mut cart);
            Ok(())
        }

        async fn remove_line(&self, line_id: &LineItemId) -> Result<(), CartError> {
            self.calls.borrow_mut().push("remove");
            let mut cart = self.cart.borrow_mut();
            let before = cart.items.len();
            cart.items.retain(|l| &l.id != line_id);
            if cart.items.len() == before {
                return Err(CartError::Server {
                    status: 404,
                    message: "Item not found".to_string(),
                });
            }
            FakeStore::recompute_subtotal(&mut cart);
            Ok(())
        }

        async fn clear(&self) -> Result<(), CartError> {
            self.calls.borrow_mut().push("clear");
            let mut cart = self.cart.borrow_mut();
            cart.items.clear();
            FakeStore::recompute_subtotal(&mut cart);
            Ok(())
        }

        async fn validate_coupon(&self, code: &str) -> Result<Coupon, CartError> {
            tokio::task::yield_now().await;
            self.calls.borrow_mut().push("coupon");
            self.coupons.get(code).cloned().ok_or_else(|| {
                CartError::CouponRejected("Invalid coupon code".to_string())
            })
        }
    }

    fn engine(store: &FakeStore) -> CartEngine<&FakeStore> {
        CartEngine::new(store, PricingPolicy::default())
    }

    #[tokio::test]
    async fn test_refresh_loads_cart() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        assert_eq!(engine.phase(), Phase::Idle);

        engine.refresh().await.unwrap();
        assert_eq!(engine.phase(), Phase::Ready);
        let view = engine.view();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.summary.total, usd(100_00));
    }

    #[tokio::test]
    async fn test_view_before_first_fetch_is_empty() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        let view = engine.view();
        assert!(view.items.is_empty());
        assert!(view.summary.total.is_zero());
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_set_quantity_zero_is_a_no_op() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        let calls_before = store.call_count();

        engine
            .set_quantity(&LineItemId::new("a"), 0)
            .await
            .unwrap();
        assert_eq!(store.call_count(), calls_before);
    }

    #[tokio::test]
    async fn test_set_quantity_over_stock_makes_no_store_call() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 3)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        let calls_before = store.call_count();

        let err = engine
            .set_quantity(&LineItemId::new("a"), 4)
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Validation(_)));
        assert!(err.user_message().contains("Only 3"));
        assert_eq!(store.call_count(), calls_before);
        // Cart unchanged.
        assert_eq!(engine.view().summary.total, usd(100_00));
    }

    #[tokio::test]
    async fn test_set_quantity_reads_after_write() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine
            .set_quantity(&LineItemId::new("a"), 3)
            .await
            .unwrap();
        // update followed by a fresh fetch
        assert_eq!(*store.calls.borrow(), vec!["fetch", "update", "fetch"]);
        assert_eq!(engine.view().summary.total, usd(150_00));
        assert!(!engine.is_updating(&LineItemId::new("a")));
    }

    #[tokio::test]
    async fn test_duplicate_inflight_update_for_same_line_is_ignored() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        // Second submission lands while the first is still at the store;
        // only the first reaches the wire.
        let line_id = LineItemId::new("a");
        let (first, second) = tokio::join!(
            engine.set_quantity(&line_id, 3),
            engine.set_quantity(&line_id, 5),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(store.calls_named("update"), 1);
        assert_eq!(engine.view().items[0].quantity, 3);
        assert!(!engine.is_updating(&line_id));
    }

    #[tokio::test]
    async fn test_different_lines_update_concurrently() {
        let store = FakeStore::new(cart_with(vec![
            line("a", 50_00, 2, 10),
            line("b", 30_00, 1, 5),
        ]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        let line_a = LineItemId::new("a");
        let line_b = LineItemId::new("b");
        let (a, b) = tokio::join!(
            engine.set_quantity(&line_a, 3),
            engine.set_quantity(&line_b, 2),
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(store.calls_named("update"), 2);
        // 3 * 50.00 + 2 * 30.00
        assert_eq!(engine.view().summary.subtotal, usd(210_00));
    }

    #[tokio::test]
    async fn test_failed_update_keeps_stale_cart_and_reenables_control() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        store.fail_next_update.set(true);

        let line_id = LineItemId::new("a");
        let err = engine.set_quantity(&line_id, 3).await.unwrap_err();
        assert!(matches!(err, CartError::Server { status: 500, .. }));
        assert_eq!(engine.phase(), Phase::Error);
        // Stale-but-available: the old cart is still displayed.
        assert_eq!(engine.view().summary.total, usd(100_00));
        // The control is re-enabled and a retry succeeds.
        assert!(!engine.is_updating(&line_id));
        engine.set_quantity(&line_id, 3).await.unwrap();
        assert_eq!(engine.view().summary.total, usd(150_00));
    }

    #[tokio::test]
    async fn test_remove_unknown_line_keeps_displayed_cart() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        let err = engine
            .remove_line_item(&LineItemId::new("ghost"))
            .await
            .unwrap_err();
        assert!(matches!(err, CartError::Server { status: 404, .. }));
        assert_eq!(engine.view().items.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_line_item() {
        let store = FakeStore::new(cart_with(vec![
            line("a", 50_00, 2, 10),
            line("b", 30_00, 1, 5),
        ]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine.remove_line_item(&LineItemId::new("b")).await.unwrap();
        let view = engine.view();
        assert_eq!(view.items.len(), 1);
        assert_eq!(view.summary.total, usd(100_00));
    }

    #[tokio::test]
    async fn test_clear_declined_makes_no_store_call() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        let calls_before = store.call_count();

        engine.clear(|| false).await.unwrap();
        assert_eq!(store.call_count(), calls_before);
        assert_eq!(engine.view().items.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_confirmed_empties_cart() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine.clear(|| true).await.unwrap();
        let view = engine.view();
        assert!(view.items.is_empty());
        assert!(view.summary.total.is_zero());
    }

    #[tokio::test]
    async fn test_apply_coupon_blank_code_makes_no_call() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        let calls_before = store.call_count();

        let err = engine.apply_coupon("   ").await.unwrap_err();
        assert!(matches!(err, CartError::Validation(_)));
        assert_eq!(store.call_count(), calls_before);
    }

    #[tokio::test]
    async fn test_apply_percentage_coupon() {
        // Subtotal 200.00, SAVE10 at 10% -> discount 20.00.
        let store = FakeStore::new(cart_with(vec![line("a", 100_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine.apply_coupon("SAVE10").await.unwrap();
        let view = engine.view();
        assert_eq!(view.summary.coupon_discount, usd(20_00));
        assert_eq!(view.summary.total, usd(180_00));
    }

    #[tokio::test]
    async fn test_coupon_validation_is_single_flight() {
        let store = FakeStore::new(cart_with(vec![line("a", 100_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        // The second submission lands while the first is at the validator;
        // it is ignored rather than queued.
        let (first, second) = tokio::join!(
            engine.apply_coupon("SAVE10"),
            engine.apply_coupon("FLAT15"),
        );
        first.unwrap();
        second.unwrap();
        assert_eq!(store.calls_named("coupon"), 1);
        assert_eq!(engine.coupon().unwrap().code, "SAVE10");
    }

    #[tokio::test]
    async fn test_new_coupon_replaces_prior() {
        let store = FakeStore::new(cart_with(vec![line("a", 100_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine.apply_coupon("SAVE10").await.unwrap();
        engine.apply_coupon("FLAT15").await.unwrap();
        // Only FLAT15 applies.
        let view = engine.view();
        assert_eq!(view.summary.coupon_discount, usd(15_00));
        assert_eq!(engine.coupon().unwrap().code, "FLAT15");
    }

    #[tokio::test]
    async fn test_rejected_coupon_message_verbatim_and_prior_kept() {
        let store = FakeStore::new(cart_with(vec![line("a", 100_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        engine.apply_coupon("SAVE10").await.unwrap();

        let err = engine.apply_coupon("BOGUS").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid coupon code");
        // The previously applied coupon is untouched.
        assert_eq!(engine.coupon().unwrap().code, "SAVE10");
    }

    #[tokio::test]
    async fn test_remove_coupon_reverts_total() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();

        engine.apply_coupon("FLAT15").await.unwrap();
        assert_eq!(engine.view().summary.total, usd(85_00));

        engine.remove_coupon();
        assert_eq!(engine.view().summary.total, usd(100_00));
    }

    #[tokio::test]
    async fn test_coupon_survives_refresh() {
        let store = FakeStore::new(cart_with(vec![line("a", 50_00, 2, 10)]));
        let engine = engine(&store);
        engine.refresh().await.unwrap();
        engine.apply_coupon("FLAT15").await.unwrap();

        // A quantity edit re-fetches the cart; the overlay re-applies.
        engine
            .set_quantity(&LineItemId::new("a"), 3)
            .await
            .unwrap();
        let view = engine.view();
        assert_eq!(view.summary.subtotal, usd(150_00));
        assert_eq!(view.summary.coupon_discount, usd(15_00));
        assert_eq!(view.summary.total, usd(135_00));
    }
}
