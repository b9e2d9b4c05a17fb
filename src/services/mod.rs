//! Application services. Each one owns a slice of the marketplace workflow and talks to
//! storage and the payment processor only through their traits.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod locks;
pub mod orders;
pub mod settlement;

use std::sync::Arc;
use crate::config::AppConfig;
use crate::domain::events::EventBus;
use crate::payments::PaymentGateway;
use crate::store::MarketplaceStore;

pub use admin::{AdminPanel, DashboardStats};
pub use cart::{CartService, CartView};
pub use catalog::CatalogService;
pub use checkout::{CheckoutOrchestrator, CheckoutRedirect};
pub use locks::KeyedLocks;
pub use orders::{NewOrder, OrderLedger};
pub use settlement::{AccountLink, PayoutRequest, SettlementEngine};

/// Every service wired to one store, one gateway and one event bus.
///
/// Cart, checkout and order placement share the per-buyer locks.
#[derive(Clone)]
pub struct Marketplace {
    pub catalog: CatalogService,
    pub carts: CartService,
    pub orders: OrderLedger,
    pub checkout: CheckoutOrchestrator,
    pub settlement: SettlementEngine,
    pub admin: AdminPanel,
}

impl Marketplace {
    pub fn new(store: Arc<dyn MarketplaceStore>, gateway: Arc<dyn PaymentGateway>, events: EventBus, config: &AppConfig) -> Self {
        let buyer_locks = Arc::new(KeyedLocks::new());
        let catalog = CatalogService::new(store.clone(), events.clone());
        let carts = CartService::new(store.clone(), buyer_locks.clone(), config.pricing);
        let orders = OrderLedger::new(store.clone(), events.clone(), buyer_locks.clone());
        let checkout = CheckoutOrchestrator::new(
            store.clone(), gateway.clone(), orders.clone(), buyer_locks, config.pricing,
            config.currency.clone(), config.gateway_timeout, config.app_base_url.clone(),
        );
        let settlement = SettlementEngine::new(store.clone(), gateway, events, config.currency.clone(), config.gateway_timeout);
        let admin = AdminPanel::new(store, catalog.clone(), settlement.clone());
        Self { catalog, carts, orders, checkout, settlement, admin }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::draft;
    use crate::domain::aggregates::{AccountStatus, CheckoutDetails, OrderStatus, PayoutStatus};
    use crate::domain::aggregates::order::address;
    use crate::domain::value_objects::Money;
    use crate::payments::SimulatedGateway;
    use crate::session::fixtures::{admin, customer, vendor};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_end_to_end_settlement() {
        let gateway = Arc::new(SimulatedGateway::default());
        let m = Marketplace::new(Arc::new(MemoryStore::new()), gateway.clone(), EventBus::disabled(), &AppConfig::default());
        let seller = vendor("v1");
        let buyer = customer("c1");

        let link = m.settlement.connect_vendor_account(&seller).await.unwrap();
        m.settlement.account_status_changed(&link.external_account_id, AccountStatus::Active, true, true).await.unwrap();
        let wheels = m.catalog.submit_product(&seller, draft("Forged Wheels", Decimal::new(174999, 2), "wheels")).await.unwrap();
        m.catalog.approve_product(&admin(), wheels.id()).await.unwrap();

        for _ in 0..3 { m.carts.add_to_cart(&buyer, wheels.id()).await.unwrap(); }
        let details = CheckoutDetails { shipping_address: address(), buyer_email: "c1@example.com".into(), payment_method: "card".into() };
        let redirect = m.checkout.create_checkout_session(&buyer, details).await.unwrap();
        // 5249.97 plus 8% tax (420.00), shipping waived
        let order = m.checkout.confirm_payment(&redirect.checkout_token, 566997).await.unwrap();
        assert!(m.carts.get_cart(&buyer).await.unwrap().cart.is_empty());

        for status in [OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered] {
            m.orders.update_order_status(&admin(), order.id(), status).await.unwrap();
        }
        assert_eq!(m.settlement.vendor_earnings("v1").await.unwrap().available_for_payout, Money::from_cents(524997));

        let request = PayoutRequest { vendor_id: "v1".into(), amount: Money::from_cents(140848), period_start: None, period_end: None, note: None };
        let payout = m.settlement.create_payout(&admin(), request).await.unwrap();
        m.admin.process_payout(&admin(), payout.id()).await.unwrap();
        assert_eq!(m.settlement.get_payout(payout.id()).await.unwrap().status(), PayoutStatus::Processed);
        assert_eq!(gateway.transferred_to(&link.external_account_id), 140848);
        assert_eq!(m.admin.dashboard(&admin()).await.unwrap().total_revenue, Money::from_cents(524997));
    }
}
