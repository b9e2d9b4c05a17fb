use std::sync::Arc;
use std::time::Duration;
use serde::Serialize;
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{Cart, Checkout, CheckoutDetails, CheckoutStatus, Order, PricingPolicy};
use crate::domain::settlement::{partition_by_vendor, ChargeGroup};
use crate::domain::value_objects::Money;
use crate::payments::{with_timeout, CheckoutSessionRequest, PaymentGateway, SessionLineItem, SessionMetadata};
use crate::services::locks::KeyedLocks;
use crate::services::orders::{NewOrder, OrderLedger};
use crate::session::Session;
use crate::store::MarketplaceStore;
use crate::{MarketplaceError, Result};

/// Where to send the buyer to pay.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRedirect {
    pub checkout_token: String,
    pub session_id: String,
    pub redirect_url: String,
}

impl From<&Checkout> for CheckoutRedirect {
    fn from(c: &Checkout) -> Self {
        Self { checkout_token: c.token().to_string(), session_id: c.session_id().to_string(), redirect_url: c.redirect_url().to_string() }
    }
}

/// Hosted checkout sessions and the payment confirmations that turn them into orders.
#[derive(Clone)]
pub struct CheckoutOrchestrator {
    store: Arc<dyn MarketplaceStore>,
    gateway: Arc<dyn PaymentGateway>,
    ledger: OrderLedger,
    buyer_locks: Arc<KeyedLocks>,
    pricing: PricingPolicy,
    currency: String,
    timeout: Duration,
    app_base_url: String,
}

impl CheckoutOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn MarketplaceStore>, gateway: Arc<dyn PaymentGateway>, ledger: OrderLedger, buyer_locks: Arc<KeyedLocks>,
        pricing: PricingPolicy, currency: impl Into<String>, timeout: Duration, app_base_url: impl Into<String>,
    ) -> Self {
        Self { store, gateway, ledger, buyer_locks, pricing, currency: currency.into(), timeout, app_base_url: app_base_url.into() }
    }

    /// Opens a hosted payment session for the buyer's cart.
    ///
    /// The cart's checkout token is the idempotency key: submitting the same cart again
    /// returns the stored session without another processor call. Nothing is stored when
    /// the processor call fails.
    #[instrument(skip(self, session, details), fields(buyer = session.user_id()))]
    pub async fn create_checkout_session(&self, session: &Session, details: CheckoutDetails) -> Result<CheckoutRedirect> {
        let buyer = session.buyer()?;
        let _guard = self.buyer_locks.lock(buyer.user_id).await;
        let cart = self.store.cart(buyer.user_id).await?.unwrap_or_else(|| Cart::for_buyer(buyer.user_id));
        if cart.is_empty() { return Err(MarketplaceError::EmptyCart); }
        let blank = details.shipping_address.blank_fields();
        if !blank.is_empty() { return Err(MarketplaceError::InvalidAddress(blank)); }
        if details.buyer_email.trim().is_empty() {
            return Err(MarketplaceError::Validation("buyer email is required".into()));
        }

        if let Some(existing) = self.store.checkout(cart.checkout_token()).await? {
            info!(token = existing.token(), "reusing checkout session");
            return Ok(CheckoutRedirect::from(&existing));
        }

        for item in cart.items() {
            let still_listed = self.store.product(&item.product_id).await?.is_some_and(|p| p.is_approved());
            if !still_listed { return Err(MarketplaceError::ProductUnavailable(item.product_id.clone())); }
        }
        let groups = self.charge_groups(&cart).await?;
        let totals = cart.totals(&self.pricing);
        minor(totals.total)?;

        let line_items = cart
            .items()
            .iter()
            .map(|i| Ok(SessionLineItem { name: i.name.clone(), unit_amount_minor: minor(i.unit_price)?, quantity: i.quantity.value(), vendor_id: i.vendor_id.clone() }))
            .collect::<Result<Vec<_>>>()?;
        let token = cart.checkout_token().to_string();
        let request = CheckoutSessionRequest {
            idempotency_key: token.clone(),
            line_items,
            shipping_minor: minor(totals.shipping)?,
            tax_minor: minor(totals.tax)?,
            currency: self.currency.clone(),
            buyer_email: details.buyer_email.clone(),
            shipping_address: details.shipping_address.clone(),
            metadata: SessionMetadata { vendor_ids: groups.iter().map(|g| g.vendor_id.clone()).collect(), buyer_id: buyer.user_id.to_string(), checkout_token: token.clone() },
            success_url: format!("{}/checkout/success?token={}", self.app_base_url, token),
            cancel_url: format!("{}/cart", self.app_base_url),
        };

        let created = with_timeout(self.timeout, self.gateway.create_checkout_session(request)).await.map_err(|e| {
            warn!(error = %e, "checkout session request failed");
            MarketplaceError::CheckoutSession(e.to_string())
        })?;
        let redirect_url = created.redirect_url.ok_or_else(|| MarketplaceError::PaymentSession("processor returned no redirect".into()))?;

        let checkout = Checkout::open(cart, buyer.name, details, totals, groups, created.session_id, redirect_url);
        self.store.save_checkout(&checkout).await?;
        info!(token = checkout.token(), total = %checkout.totals().total, vendors = checkout.charge_groups().len(), "checkout session opened");
        Ok(CheckoutRedirect::from(&checkout))
    }

    async fn charge_groups(&self, cart: &Cart) -> Result<Vec<ChargeGroup>> {
        let mut groups = partition_by_vendor(cart.items().iter().map(|i| (i.vendor_id.as_str(), i.line_total())));
        for group in &mut groups {
            group.external_account_id = self.store.vendor(&group.vendor_id).await?.and_then(|v| v.external_account_id().map(str::to_string));
        }
        Ok(groups)
    }

    /// Processor notification that a checkout was paid. Places the order exactly once;
    /// later confirmations for the same checkout return that order.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, checkout_token: &str, amount_captured_minor: i64) -> Result<Order> {
        let mut checkout = self
            .store
            .checkout(checkout_token)
            .await?
            .ok_or_else(|| MarketplaceError::CheckoutNotFound(checkout_token.to_string()))?;
        if let (CheckoutStatus::Completed, Some(order_id)) = (checkout.status(), checkout.order_id()) {
            return self.ledger.get_order(order_id).await;
        }

        let expected = minor(checkout.totals().total)?;
        if expected != amount_captured_minor {
            warn!(expected, captured = amount_captured_minor, "captured amount does not match checkout");
            return Err(MarketplaceError::PaymentMismatch { expected, captured: amount_captured_minor });
        }

        let order = self
            .ledger
            .create_order(NewOrder {
                cart: checkout.cart(),
                customer_name: checkout.buyer_name(),
                totals: checkout.totals(),
                shipping_address: checkout.shipping_address().clone(),
                payment_method: checkout.payment_method(),
                source_token: checkout.token(),
            })
            .await?;
        checkout.complete(order.id());
        self.store.save_checkout(&checkout).await?;
        Ok(order)
    }
}

fn minor(amount: Money) -> Result<i64> {
    amount.to_minor_units().ok_or_else(|| MarketplaceError::Validation(format!("amount {amount} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::approved;
    use crate::domain::aggregates::order::address;
    use crate::domain::aggregates::{AccountStatus, OrderStatus, Vendor};
    use crate::domain::events::EventBus;
    use crate::payments::SimulatedGateway;
    use crate::session::fixtures::{customer, vendor};
    use crate::store::MemoryStore;

    struct Fixture {
        checkout: CheckoutOrchestrator,
        store: Arc<MemoryStore>,
        gateway: Arc<SimulatedGateway>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(SimulatedGateway::new("https://pay.example"));
        let locks = Arc::new(KeyedLocks::new());
        let ledger = OrderLedger::new(store.clone(), EventBus::disabled(), locks.clone());
        let checkout = CheckoutOrchestrator::new(store.clone(), gateway.clone(), ledger, locks, PricingPolicy::default(), "usd", Duration::from_secs(5), "https://shop.example");
        Fixture { checkout, store, gateway }
    }

    async fn fill_cart(store: &MemoryStore, products: &[(&str, i64, &str)]) -> Cart {
        let mut cart = Cart::for_buyer("c1");
        for (name, cents, vendor_id) in products {
            let p = approved(name, *cents, vendor_id);
            store.insert_product(&p).await.unwrap();
            cart.add_product(&p).unwrap();
        }
        store.save_cart(&cart).await.unwrap();
        cart
    }

    fn details() -> CheckoutDetails {
        CheckoutDetails { shipping_address: address(), buyer_email: "c1@example.com".into(), payment_method: "card".into() }
    }

    #[tokio::test]
    async fn test_double_submit_opens_one_session() {
        let f = fixture();
        let mut v1 = Vendor::register("v1", "u-v1", "TurboTech", "t@example.com");
        v1.link_account("acct_v1");
        v1.apply_account_update(AccountStatus::Active, true, true);
        f.store.save_vendor(&v1).await.unwrap();
        let cart = fill_cart(&f.store, &[("Performance Exhaust System", 54999, "v1"), ("Brake Kit", 4500, "v2")]).await;

        let first = f.checkout.create_checkout_session(&customer("c1"), details()).await.unwrap();
        let second = f.checkout.create_checkout_session(&customer("c1"), details()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.checkout_token, cart.checkout_token());
        assert!(first.redirect_url.starts_with("https://pay.example/pay/"));
        assert_eq!(f.gateway.sessions_created(), 1);

        let stored = f.store.checkout(cart.checkout_token()).await.unwrap().unwrap();
        let groups = stored.charge_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].external_account_id.as_deref(), Some("acct_v1"));
        assert_eq!(groups[1].external_account_id, None);
        assert_eq!(groups[1].subtotal, Money::from_cents(4500));
        assert!(f.store.orders().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkout_validation() {
        let f = fixture();
        assert!(matches!(f.checkout.create_checkout_session(&customer("c1"), details()).await, Err(MarketplaceError::EmptyCart)));
        assert!(matches!(f.checkout.create_checkout_session(&vendor("v1"), details()).await, Err(MarketplaceError::Forbidden(_))));

        fill_cart(&f.store, &[("Hood", 89999, "v2")]).await;
        let mut d = details();
        d.shipping_address.city = "  ".into();
        d.shipping_address.country.clear();
        match f.checkout.create_checkout_session(&customer("c1"), d).await {
            Err(MarketplaceError::InvalidAddress(fields)) => assert_eq!(fields, vec!["city", "country"]),
            other => panic!("expected invalid address, got {other:?}"),
        }
        assert_eq!(f.gateway.sessions_created(), 0);
    }

    #[tokio::test]
    async fn test_unlisted_product_blocks_checkout() {
        let f = fixture();
        let mut cart = fill_cart(&f.store, &[("Hood", 89999, "v2")]).await;
        cart.add_product(&approved("Ghost Part", 1000, "v9")).unwrap();
        f.store.save_cart(&cart).await.unwrap();
        assert!(matches!(f.checkout.create_checkout_session(&customer("c1"), details()).await, Err(MarketplaceError::ProductUnavailable(_))));
    }

    #[tokio::test]
    async fn test_gateway_failures_leave_no_state() {
        let f = fixture();
        let cart = fill_cart(&f.store, &[("Hood", 89999, "v2")]).await;
        f.gateway.fail_next_checkout("processor down");
        assert!(matches!(f.checkout.create_checkout_session(&customer("c1"), details()).await, Err(MarketplaceError::CheckoutSession(_))));
        assert!(f.store.checkout(cart.checkout_token()).await.unwrap().is_none());

        f.gateway.omit_redirects();
        let mut cart = cart;
        let hood = cart.items()[0].product_id.clone();
        cart.update_quantity(&hood, 2).unwrap();
        f.store.save_cart(&cart).await.unwrap();
        assert!(matches!(f.checkout.create_checkout_session(&customer("c1"), details()).await, Err(MarketplaceError::PaymentSession(_))));
        assert!(f.store.checkout(cart.checkout_token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_total_beyond_minor_units_is_refused() {
        let f = fixture();
        let names: Vec<String> = (0..21).map(|n| format!("Part {n}")).collect();
        let products: Vec<(&str, i64, &str)> = names.iter().map(|n| (n.as_str(), 99_999_999, "v1")).collect();
        let mut cart = fill_cart(&f.store, &products).await;
        let ids: Vec<String> = cart.items().iter().map(|i| i.product_id.clone()).collect();
        for id in &ids { cart.update_quantity(id, i64::from(u32::MAX)).unwrap(); }
        f.store.save_cart(&cart).await.unwrap();

        // subtotal fits in cents, tax pushes the total past i64
        assert!(matches!(f.checkout.create_checkout_session(&customer("c1"), details()).await, Err(MarketplaceError::Validation(_))));
        assert_eq!(f.gateway.sessions_created(), 0);
        assert!(f.store.checkout(cart.checkout_token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_confirmation_places_one_order() {
        let f = fixture();
        fill_cart(&f.store, &[("Performance Exhaust System", 54999, "v1")]).await;
        let redirect = f.checkout.create_checkout_session(&customer("c1"), details()).await.unwrap();

        let err = f.checkout.confirm_payment(&redirect.checkout_token, 100).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::PaymentMismatch { expected: 59399, captured: 100 }));
        assert!(f.store.orders().await.unwrap().is_empty());

        let order = f.checkout.confirm_payment(&redirect.checkout_token, 59399).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.grand_total(), Money::from_cents(59399));
        assert!(f.store.cart("c1").await.unwrap().unwrap().is_empty());

        let again = f.checkout.confirm_payment(&redirect.checkout_token, 59399).await.unwrap();
        assert_eq!(again.id(), order.id());
        assert_eq!(f.store.orders().await.unwrap().len(), 1);
        assert!(matches!(f.checkout.confirm_payment("unknown", 1).await, Err(MarketplaceError::CheckoutNotFound(_))));
    }
}
