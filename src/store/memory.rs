//! In-memory store. Used by tests and by the binary when no database is configured.
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::domain::aggregates::{Cart, Checkout, Order, Payout, Product, Vendor};
use crate::{MarketplaceError, Result};
use super::{MarketplaceStore, OrderPlacement};

#[derive(Default)]
struct Tables {
    products: Vec<Product>,
    carts: HashMap<String, Cart>,
    checkouts: HashMap<String, Checkout>,
    orders: Vec<Order>,
    vendors: Vec<Vendor>,
    payouts: Vec<Payout>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

fn replace<T>(rows: &mut [T], key: impl Fn(&T) -> bool, value: &T, what: &str) -> Result<()>
where
    T: Clone,
{
    let row = rows.iter_mut().find(|r| key(r)).ok_or_else(|| MarketplaceError::StorageError(format!("{what} does not exist")))?;
    *row = value.clone();
    Ok(())
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn insert_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        if t.products.iter().any(|p| p.id() == product.id()) {
            return Err(MarketplaceError::StorageError(format!("duplicate product {}", product.id())));
        }
        t.products.push(product.clone());
        Ok(())
    }

    async fn save_product(&self, product: &Product) -> Result<()> {
        let mut t = self.tables.write().await;
        replace(&mut t.products, |p| p.id() == product.id(), product, "product")
    }

    async fn product(&self, id: &str) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.iter().find(|p| p.id() == id).cloned())
    }

    async fn products(&self) -> Result<Vec<Product>> {
        Ok(self.tables.read().await.products.clone())
    }

    async fn cart(&self, buyer_id: &str) -> Result<Option<Cart>> {
        Ok(self.tables.read().await.carts.get(buyer_id).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.tables.write().await.carts.insert(cart.buyer_id().to_string(), cart.clone());
        Ok(())
    }

    async fn checkout(&self, token: &str) -> Result<Option<Checkout>> {
        Ok(self.tables.read().await.checkouts.get(token).cloned())
    }

    async fn save_checkout(&self, checkout: &Checkout) -> Result<()> {
        self.tables.write().await.checkouts.insert(checkout.token().to_string(), checkout.clone());
        Ok(())
    }

    async fn place_order(&self, order: &Order) -> Result<OrderPlacement> {
        let mut t = self.tables.write().await;
        if let Some(existing) = t.orders.iter().find(|o| o.customer_id() == order.customer_id() && o.source_token() == order.source_token()) {
            return Ok(OrderPlacement::Existing(existing.clone()));
        }
        t.orders.push(order.clone());
        if let Some(cart) = t.carts.get_mut(order.customer_id()) {
            if cart.checkout_token() == order.source_token() {
                cart.clear();
            }
        }
        Ok(OrderPlacement::Created(order.clone()))
    }

    async fn save_order(&self, order: &Order) -> Result<()> {
        let mut t = self.tables.write().await;
        replace(&mut t.orders, |o| o.id() == order.id(), order, "order")
    }

    async fn order(&self, id: &str) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn orders(&self) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.orders.clone())
    }

    async fn customer_orders(&self, customer_id: &str) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.orders.iter().filter(|o| o.customer_id() == customer_id).cloned().collect())
    }

    async fn vendor_orders(&self, vendor_id: &str) -> Result<Vec<Order>> {
        Ok(self.tables.read().await.orders.iter().filter(|o| o.items().iter().any(|l| l.vendor_id == vendor_id)).cloned().collect())
    }

    async fn save_vendor(&self, vendor: &Vendor) -> Result<()> {
        let mut t = self.tables.write().await;
        match t.vendors.iter_mut().find(|v| v.id() == vendor.id()) {
            Some(row) => *row = vendor.clone(),
            None => t.vendors.push(vendor.clone()),
        }
        Ok(())
    }

    async fn vendor(&self, id: &str) -> Result<Option<Vendor>> {
        Ok(self.tables.read().await.vendors.iter().find(|v| v.id() == id).cloned())
    }

    async fn vendor_by_account(&self, external_account_id: &str) -> Result<Option<Vendor>> {
        Ok(self.tables.read().await.vendors.iter().find(|v| v.external_account_id() == Some(external_account_id)).cloned())
    }

    async fn vendors(&self) -> Result<Vec<Vendor>> {
        Ok(self.tables.read().await.vendors.clone())
    }

    async fn insert_payout(&self, payout: &Payout) -> Result<()> {
        self.tables.write().await.payouts.push(payout.clone());
        Ok(())
    }

    async fn save_payout(&self, payout: &Payout) -> Result<()> {
        let mut t = self.tables.write().await;
        replace(&mut t.payouts, |p| p.id() == payout.id(), payout, "payout")
    }

    async fn payout(&self, id: &str) -> Result<Option<Payout>> {
        Ok(self.tables.read().await.payouts.iter().find(|p| p.id() == id).cloned())
    }

    async fn payout_by_transfer(&self, external_transfer_id: &str) -> Result<Option<Payout>> {
        Ok(self.tables.read().await.payouts.iter().find(|p| p.external_transfer_id() == Some(external_transfer_id)).cloned())
    }

    async fn payouts(&self, vendor_id: Option<&str>) -> Result<Vec<Payout>> {
        let t = self.tables.read().await;
        Ok(t.payouts.iter().filter(|p| vendor_id.map_or(true, |v| p.vendor_id() == v)).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::approved;
    use crate::domain::aggregates::order::address;
    use crate::domain::aggregates::CartTotals;

    #[tokio::test]
    async fn test_place_order_is_unique_per_token() {
        let store = MemoryStore::new();
        let mut cart = Cart::for_buyer("c1");
        cart.add_product(&approved("Hood", 89999, "v2")).unwrap();
        store.save_cart(&cart).await.unwrap();

        let first = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", cart.checkout_token()).unwrap();
        let second = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", cart.checkout_token()).unwrap();
        assert!(matches!(store.place_order(&first).await.unwrap(), OrderPlacement::Created(_)));
        match store.place_order(&second).await.unwrap() {
            OrderPlacement::Existing(o) => assert_eq!(o.id(), first.id()),
            other => panic!("expected existing order, got {other:?}"),
        }
        assert_eq!(store.orders().await.unwrap().len(), 1);
        assert!(store.cart("c1").await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_place_order_keeps_changed_cart() {
        let store = MemoryStore::new();
        let mut cart = Cart::for_buyer("c1");
        cart.add_product(&approved("Hood", 89999, "v2")).unwrap();
        let order = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", cart.checkout_token()).unwrap();
        cart.add_product(&approved("Wheels", 129999, "v6")).unwrap();
        store.save_cart(&cart).await.unwrap();
        store.place_order(&order).await.unwrap();
        assert_eq!(store.cart("c1").await.unwrap().unwrap().item_count(), 2);
    }

    #[tokio::test]
    async fn test_saving_unknown_payout_fails() {
        let store = MemoryStore::new();
        let payout = Payout::request("v1", "v1 shop", crate::domain::value_objects::Money::from_cents(100), None, None).unwrap();
        match store.save_payout(&payout).await {
            Err(MarketplaceError::StorageError(msg)) => assert_eq!(msg, "payout does not exist"),
            other => panic!("expected storage error, got {other:?}"),
        }
    }
}
