use std::sync::Arc;
use serde::Serialize;
use tracing::{debug, instrument};
use crate::domain::aggregates::{Cart, CartTotals, PricingPolicy};
use crate::services::locks::KeyedLocks;
use crate::session::Session;
use crate::store::MarketplaceStore;
use crate::{MarketplaceError, Result};

/// Cart plus its computed totals.
#[derive(Clone, Debug, Serialize)]
pub struct CartView {
    pub cart: Cart,
    pub totals: CartTotals,
}

/// Buyer carts. Every mutation is persisted before it returns.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn MarketplaceStore>,
    buyer_locks: Arc<KeyedLocks>,
    pricing: PricingPolicy,
}

impl CartService {
    pub fn new(store: Arc<dyn MarketplaceStore>, buyer_locks: Arc<KeyedLocks>, pricing: PricingPolicy) -> Self {
        Self { store, buyer_locks, pricing }
    }

    pub fn pricing(&self) -> &PricingPolicy { &self.pricing }

    pub async fn get_cart(&self, session: &Session) -> Result<CartView> {
        let buyer = session.buyer()?;
        let cart = self.load(buyer.user_id).await?;
        Ok(self.view(cart))
    }

    #[instrument(skip(self, session), fields(buyer = session.user_id()))]
    pub async fn add_to_cart(&self, session: &Session, product_id: &str) -> Result<CartView> {
        let product = self.store.product(product_id).await?.ok_or_else(|| MarketplaceError::ProductNotFound(product_id.to_string()))?;
        self.mutate(session, |cart| cart.add_product(&product)).await
    }

    #[instrument(skip(self, session), fields(buyer = session.user_id()))]
    pub async fn update_quantity(&self, session: &Session, product_id: &str, quantity: i64) -> Result<CartView> {
        self.mutate(session, |cart| cart.update_quantity(product_id, quantity)).await
    }

    pub async fn remove_from_cart(&self, session: &Session, product_id: &str) -> Result<CartView> {
        self.mutate(session, |cart| cart.remove_item(product_id)).await
    }

    pub async fn clear_cart(&self, session: &Session) -> Result<CartView> {
        self.mutate(session, |cart| { cart.clear(); Ok(()) }).await
    }

    async fn mutate<F>(&self, session: &Session, change: F) -> Result<CartView>
    where
        F: FnOnce(&mut Cart) -> std::result::Result<(), crate::domain::aggregates::CartError>,
    {
        let buyer = session.buyer()?;
        let _guard = self.buyer_locks.lock(buyer.user_id).await;
        let mut cart = self.load(buyer.user_id).await?;
        change(&mut cart)?;
        self.store.save_cart(&cart).await?;
        debug!(items = cart.item_count(), "cart saved");
        Ok(self.view(cart))
    }

    async fn load(&self, buyer_id: &str) -> Result<Cart> {
        Ok(self.store.cart(buyer_id).await?.unwrap_or_else(|| Cart::for_buyer(buyer_id)))
    }

    fn view(&self, cart: Cart) -> CartView {
        let totals = cart.totals(&self.pricing);
        CartView { cart, totals }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::approved;
    use crate::domain::aggregates::product::draft;
    use crate::domain::aggregates::Product;
    use crate::domain::value_objects::Money;
    use crate::session::fixtures::{customer, vendor};
    use crate::store::MemoryStore;
    use rust_decimal::Decimal;

    async fn setup() -> (CartService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let svc = CartService::new(store.clone(), Arc::new(KeyedLocks::new()), PricingPolicy::default());
        (svc, store)
    }

    #[tokio::test]
    async fn test_add_only_approved() {
        let (svc, store) = setup().await;
        let exhaust = approved("Performance Exhaust System", 54999, "v1");
        let pending = Product::submit(draft("Hood", Decimal::ONE, "exterior"), "v2", "C").unwrap();
        store.insert_product(&exhaust).await.unwrap();
        store.insert_product(&pending).await.unwrap();

        let view = svc.add_to_cart(&customer("c1"), exhaust.id()).await.unwrap();
        assert_eq!(view.totals.total, Money::from_cents(59399));
        assert!(matches!(svc.add_to_cart(&customer("c1"), pending.id()).await, Err(MarketplaceError::ProductUnavailable(_))));
        assert!(matches!(svc.add_to_cart(&customer("c1"), "missing").await, Err(MarketplaceError::ProductNotFound(_))));
        assert!(matches!(svc.add_to_cart(&vendor("v1"), exhaust.id()).await, Err(MarketplaceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_cart_persists_per_buyer() {
        let (svc, store) = setup().await;
        let seats = approved("Racing Seats", 42999, "v4");
        store.insert_product(&seats).await.unwrap();
        svc.add_to_cart(&customer("c1"), seats.id()).await.unwrap();
        svc.add_to_cart(&customer("c1"), seats.id()).await.unwrap();

        let reopened = CartService::new(store.clone(), Arc::new(KeyedLocks::new()), PricingPolicy::default());
        let view = reopened.get_cart(&customer("c1")).await.unwrap();
        assert_eq!(view.cart.items()[0].quantity.value(), 2);
        assert!(reopened.get_cart(&customer("c2")).await.unwrap().cart.is_empty());

        svc.update_quantity(&customer("c1"), seats.id(), -3).await.unwrap();
        assert!(store.cart("c1").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_cart() {
        let (svc, store) = setup().await;
        let chip = approved("Chip", 19999, "v1");
        store.insert_product(&chip).await.unwrap();
        svc.add_to_cart(&customer("c1"), chip.id()).await.unwrap();
        let view = svc.clear_cart(&customer("c1")).await.unwrap();
        assert!(view.cart.is_empty());
        assert_eq!(view.totals, CartTotals::default());
        assert!(matches!(svc.remove_from_cart(&customer("c1"), chip.id()).await, Err(MarketplaceError::ItemNotFound)));
    }

    #[tokio::test]
    async fn test_overflowing_quantity_is_refused() {
        let (svc, store) = setup().await;
        let mut ids = vec![];
        for n in 0..22 {
            let part = approved(&format!("Part {n}"), 99_999_999, "v1");
            store.insert_product(&part).await.unwrap();
            svc.add_to_cart(&customer("c1"), part.id()).await.unwrap();
            ids.push(part.id().to_string());
        }
        for id in &ids[..21] { svc.update_quantity(&customer("c1"), id, i64::from(u32::MAX)).await.unwrap(); }
        let err = svc.update_quantity(&customer("c1"), &ids[21], i64::from(u32::MAX)).await.unwrap_err();
        assert!(matches!(err, MarketplaceError::InvalidQuantity));
        assert_eq!(store.cart("c1").await.unwrap().unwrap().items()[21].quantity.value(), 1);
    }
}
