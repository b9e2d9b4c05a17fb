use std::sync::Arc;
use tracing::{info, instrument};
use crate::domain::aggregates::{Cart, CartTotals, Order, OrderStatus};
use crate::domain::events::EventBus;
use crate::domain::value_objects::Address;
use crate::services::locks::KeyedLocks;
use crate::session::Session;
use crate::store::{MarketplaceStore, OrderPlacement};
use crate::{MarketplaceError, Result};

/// Input for placing an order from a cart snapshot.
pub struct NewOrder<'a> {
    pub cart: &'a Cart,
    pub customer_name: &'a str,
    pub totals: CartTotals,
    pub shipping_address: Address,
    pub payment_method: &'a str,
    /// Checkout token the cart carried; at most one order exists per buyer and token.
    pub source_token: &'a str,
}

/// Immutable order records and their status progression.
#[derive(Clone)]
pub struct OrderLedger {
    store: Arc<dyn MarketplaceStore>,
    events: EventBus,
    buyer_locks: Arc<KeyedLocks>,
}

impl OrderLedger {
    pub fn new(store: Arc<dyn MarketplaceStore>, events: EventBus, buyer_locks: Arc<KeyedLocks>) -> Self {
        Self { store, events, buyer_locks }
    }

    /// Snapshots the cart into a pending order and empties the buyer's cart in the same
    /// store write. Repeating the call with the same source token returns the first order.
    #[instrument(skip(self, new), fields(buyer = new.cart.buyer_id(), token = new.source_token))]
    pub async fn create_order(&self, new: NewOrder<'_>) -> Result<Order> {
        let _guard = self.buyer_locks.lock(new.cart.buyer_id()).await;
        let mut order = Order::place(new.cart, new.customer_name, new.totals, new.shipping_address, new.payment_method, new.source_token)?;
        match self.store.place_order(&order).await? {
            OrderPlacement::Existing(existing) => {
                info!(order_id = existing.id(), "order already placed for this checkout");
                Ok(existing)
            }
            OrderPlacement::Created(_) => {
                info!(order_id = order.id(), total = %order.total(), "order created");
                self.events.publish_all(order.take_events()).await;
                Ok(order)
            }
        }
    }

    #[instrument(skip(self, session))]
    pub async fn update_order_status(&self, session: &Session, order_id: &str, status: OrderStatus) -> Result<Order> {
        session.require_admin()?;
        let mut order = self.get_order(order_id).await?;
        if order.transition(status)? {
            self.store.save_order(&order).await?;
            info!(status = status.as_str(), "order status updated");
            self.events.publish_all(order.take_events()).await;
        }
        Ok(order)
    }

    pub async fn get_order(&self, order_id: &str) -> Result<Order> {
        self.store.order(order_id).await?.ok_or_else(|| MarketplaceError::OrderNotFound(order_id.to_string()))
    }

    /// An order as seen by `session`: admins see every order, customers only their own.
    pub async fn view_order(&self, session: &Session, order_id: &str) -> Result<Order> {
        let order = self.get_order(order_id).await?;
        match session {
            Session::Admin { .. } => Ok(order),
            Session::Customer { user_id, .. } if order.customer_id() == user_id => Ok(order),
            _ => Err(MarketplaceError::OrderNotFound(order_id.to_string())),
        }
    }

    pub async fn list_orders(&self, session: &Session) -> Result<Vec<Order>> {
        session.require_admin()?;
        self.store.orders().await
    }

    pub async fn customer_orders(&self, session: &Session) -> Result<Vec<Order>> {
        let buyer = session.buyer()?;
        self.store.customer_orders(buyer.user_id).await
    }
}
