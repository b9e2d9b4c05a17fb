use std::sync::Arc;
use serde::Serialize;
use tracing::instrument;
use crate::domain::aggregates::{AccountStatus, OrderStatus, Payout, PayoutStatus, Product, ProductStatus};
use crate::domain::value_objects::Money;
use crate::services::catalog::CatalogService;
use crate::services::settlement::SettlementEngine;
use crate::session::Session;
use crate::store::MarketplaceStore;
use crate::Result;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Order totals excluding cancelled orders.
    pub total_revenue: Money,
    pub pending_orders: usize,
    pub active_vendors: usize,
    pub pending_products: usize,
    pub pending_payouts: usize,
}

/// Moderation queues and marketplace-wide figures. Every operation needs an admin session.
#[derive(Clone)]
pub struct AdminPanel {
    store: Arc<dyn MarketplaceStore>,
    catalog: CatalogService,
    settlement: SettlementEngine,
}

impl AdminPanel {
    pub fn new(store: Arc<dyn MarketplaceStore>, catalog: CatalogService, settlement: SettlementEngine) -> Self {
        Self { store, catalog, settlement }
    }

    pub async fn pending_products(&self, session: &Session) -> Result<Vec<Product>> {
        session.require_admin()?;
        self.catalog.pending_products().await
    }

    pub async fn pending_payouts(&self, session: &Session) -> Result<Vec<Payout>> {
        session.require_admin()?;
        Ok(self.store.payouts(None).await?.into_iter().filter(|p| p.status() == PayoutStatus::Pending).collect())
    }

    pub async fn process_payout(&self, session: &Session, payout_id: &str) -> Result<Payout> {
        self.settlement.update_payout_status(session, payout_id, PayoutStatus::Processed).await
    }

    #[instrument(skip(self, session))]
    pub async fn dashboard(&self, session: &Session) -> Result<DashboardStats> {
        session.require_admin()?;
        let orders = self.store.orders().await?;
        let vendors = self.store.vendors().await?;
        let products = self.store.products().await?;
        let payouts = self.store.payouts(None).await?;

        Ok(DashboardStats {
            total_revenue: orders.iter().filter(|o| o.status() != OrderStatus::Cancelled).map(|o| o.total()).sum(),
            pending_orders: orders.iter().filter(|o| o.status() == OrderStatus::Pending).count(),
            active_vendors: vendors.iter().filter(|v| v.account_status() == AccountStatus::Active).count(),
            pending_products: products.iter().filter(|p| p.status() == ProductStatus::Pending).count(),
            pending_payouts: payouts.iter().filter(|p| p.status() == PayoutStatus::Pending).count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::approved;
    use crate::domain::aggregates::order::address;
    use crate::domain::aggregates::product::draft;
    use crate::domain::aggregates::{Cart, CartTotals, Order, Vendor};
    use crate::domain::events::EventBus;
    use crate::payments::SimulatedGateway;
    use crate::services::settlement::PayoutRequest;
    use crate::session::fixtures::{admin, customer, vendor};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;
    use std::time::Duration;

    fn panel(store: Arc<MemoryStore>) -> AdminPanel {
        let catalog = CatalogService::new(store.clone(), EventBus::disabled());
        let settlement = SettlementEngine::new(store.clone(), Arc::new(SimulatedGateway::default()), EventBus::disabled(), "usd", Duration::from_secs(5));
        AdminPanel::new(store, catalog, settlement)
    }

    async fn order(store: &MemoryStore, cents: i64, path: &[OrderStatus]) {
        let mut cart = Cart::for_buyer("c1");
        cart.add_product(&approved("Part", cents, "v1")).unwrap();
        let mut order = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", cart.checkout_token()).unwrap();
        for s in path { order.transition(*s).unwrap(); }
        store.place_order(&order).await.unwrap();
    }

    #[tokio::test]
    async fn test_dashboard_excludes_cancelled_revenue() {
        let store = Arc::new(MemoryStore::new());
        let admin_panel = panel(store.clone());
        order(&store, 10000, &[]).await;
        order(&store, 20000, &[OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered]).await;
        order(&store, 99999, &[OrderStatus::Cancelled]).await;
        let mut active = Vendor::register("v1", "u-v1", "v1 shop", "v1@example.com");
        active.link_account("acct_v1");
        active.apply_account_update(AccountStatus::Active, true, true);
        store.save_vendor(&active).await.unwrap();
        store.save_vendor(&Vendor::register("v2", "u-v2", "v2 shop", "v2@example.com")).await.unwrap();
        store.insert_product(&Product::submit(draft("Hood", Decimal::ONE, "exterior"), "v2", "v2 shop").unwrap()).await.unwrap();

        let stats = admin_panel.dashboard(&admin()).await.unwrap();
        assert_eq!(stats, DashboardStats {
            total_revenue: Money::from_cents(30000),
            pending_orders: 1,
            active_vendors: 1,
            pending_products: 1,
            pending_payouts: 0,
        });
        assert!(matches!(admin_panel.dashboard(&vendor("v1")).await, Err(crate::MarketplaceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_process_pending_payout() {
        let store = Arc::new(MemoryStore::new());
        let admin_panel = panel(store.clone());
        order(&store, 20000, &[OrderStatus::Processing, OrderStatus::Shipped, OrderStatus::Delivered]).await;
        let mut v = Vendor::register("v1", "u-v1", "v1 shop", "v1@example.com");
        v.link_account("acct_v1");
        v.apply_account_update(AccountStatus::Active, true, true);
        store.save_vendor(&v).await.unwrap();

        let request = PayoutRequest { vendor_id: "v1".into(), amount: Money::from_cents(5000), period_start: None, period_end: None, note: Some("weekly".into()) };
        let payout = admin_panel.settlement.create_payout(&admin(), request).await.unwrap();
        assert_eq!(admin_panel.pending_payouts(&admin()).await.unwrap().len(), 1);
        assert!(admin_panel.pending_payouts(&customer("c1")).await.is_err());

        let processed = admin_panel.process_payout(&admin(), payout.id()).await.unwrap();
        assert_eq!(processed.status(), PayoutStatus::Processed);
        assert_eq!(processed.note(), Some("weekly"));
        assert_eq!(processed.vendor_name(), "v1 shop");
        assert!(admin_panel.pending_payouts(&admin()).await.unwrap().is_empty());
    }
}
