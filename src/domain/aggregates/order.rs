//! Order Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::cart::{Cart, CartTotals};
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{new_id, Address, Money, Quantity};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    customer_id: String,
    customer_name: String,
    status: OrderStatus,
    items: Vec<LineItem>,
    total: Money,
    shipping: Money,
    tax: Money,
    shipping_address: Address,
    payment_method: String,
    source_token: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Immutable copy of a cart line taken when the order is placed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: String,
    pub name: String,
    pub vendor_id: String,
    pub vendor_name: String,
    pub quantity: Quantity,
    pub unit_price: Money,
    pub total: Money,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }

    fn rank(&self) -> u8 {
        match self { Self::Pending => 0, Self::Processing => 1, Self::Shipped => 2, Self::Delivered => 3, Self::Cancelled => 4 }
    }

    /// Forward moves along pending → processing → shipped → delivered, or cancellation
    /// from any non-terminal state.
    pub fn can_become(&self, next: OrderStatus) -> bool {
        if self.is_terminal() { return false; }
        next == Self::Cancelled || next.rank() > self.rank()
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "shipped" => Ok(Self::Shipped),
            "delivered" => Ok(Self::Delivered),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

impl Order {
    /// Places an order from a cart snapshot. Later catalog price changes never touch it.
    pub fn place(
        cart: &Cart, customer_name: impl Into<String>, totals: CartTotals, shipping_address: Address,
        payment_method: impl Into<String>, source_token: impl Into<String>,
    ) -> Result<Self, OrderError> {
        if cart.is_empty() { return Err(OrderError::EmptyCart); }
        let blank = shipping_address.blank_fields();
        if !blank.is_empty() { return Err(OrderError::InvalidAddress(blank)); }

        let items: Vec<LineItem> = cart.items().iter().map(|i| LineItem {
            product_id: i.product_id.clone(), name: i.name.clone(), vendor_id: i.vendor_id.clone(), vendor_name: i.vendor_name.clone(),
            quantity: i.quantity, unit_price: i.unit_price, total: i.line_total(),
        }).collect();
        let total = items.iter().map(|l| l.total).sum();
        let now = Utc::now();
        let mut order = Self {
            id: new_id(), customer_id: cart.buyer_id().to_string(), customer_name: customer_name.into(),
            status: OrderStatus::Pending, items, total, shipping: totals.shipping, tax: totals.tax,
            shipping_address, payment_method: payment_method.into(), source_token: source_token.into(),
            created_at: now, updated_at: now, events: vec![],
        };
        order.raise_event(DomainEvent::Order(OrderEvent::Created {
            order_id: order.id.clone(), customer_id: order.customer_id.clone(), total, vendor_ids: order.vendor_ids(),
        }));
        Ok(order)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_id(&self) -> &str { &self.customer_id }
    pub fn customer_name(&self) -> &str { &self.customer_name }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn items(&self) -> &[LineItem] { &self.items }
    /// Sum of line extended prices.
    pub fn total(&self) -> Money { self.total }
    pub fn shipping(&self) -> Money { self.shipping }
    pub fn tax(&self) -> Money { self.tax }
    /// Amount charged to the buyer.
    pub fn grand_total(&self) -> Money { self.total + self.shipping + self.tax }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn payment_method(&self) -> &str { &self.payment_method }
    pub fn source_token(&self) -> &str { &self.source_token }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Distinct vendor ids in first-seen line order.
    pub fn vendor_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = Vec::new();
        for line in &self.items {
            if !ids.contains(&line.vendor_id) { ids.push(line.vendor_id.clone()); }
        }
        ids
    }

    /// Sum of this order's lines owned by `vendor_id`.
    pub fn vendor_total(&self, vendor_id: &str) -> Money {
        self.items.iter().filter(|l| l.vendor_id == vendor_id).map(|l| l.total).sum()
    }

    /// Returns `Ok(false)` when the order already has `next` status.
    pub fn transition(&mut self, next: OrderStatus) -> Result<bool, OrderError> {
        if self.status == next { return Ok(false); }
        if !self.status.can_become(next) { return Err(OrderError::InvalidTransition { from: self.status, to: next }); }
        let from = self.status;
        self.status = next;
        self.touch();
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged {
            order_id: self.id.clone(), from: from.as_str().into(), to: next.as_str().into(),
        }));
        Ok(true)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError { EmptyCart, InvalidAddress(Vec<&'static str>), InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCart => write!(f, "Cart is empty"),
            Self::InvalidAddress(fields) => write!(f, "Missing shipping fields: {}", fields.join(", ")),
            Self::InvalidTransition { from, to } => write!(f, "Cannot move order from {} to {}", from.as_str(), to.as_str()),
        }
    }
}

#[cfg(test)]
pub(crate) fn address() -> Address {
    Address { full_name: "Ada Lovelace".into(), street_address: "1 Analytical Way".into(), city: "London".into(), state: "LDN".into(), zip_code: "N1 9GU".into(), country: "GB".into() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::cart::{approved, PricingPolicy};

    fn two_vendor_cart() -> Cart {
        let mut cart = Cart::for_buyer("c1");
        cart.add_product(&approved("Exhaust", 54999, "v1")).unwrap();
        cart.add_product(&approved("Hood", 89999, "v2")).unwrap();
        cart.add_product(&approved("Chip", 19999, "v1")).unwrap();
        cart
    }

    #[test]
    fn test_order_snapshot() {
        let cart = two_vendor_cart();
        let totals = cart.totals(&PricingPolicy::default());
        let mut order = Order::place(&cart, "Ada", totals, address(), "card", cart.checkout_token()).unwrap();
        assert_eq!(order.total(), Money::from_cents(54999 + 89999 + 19999));
        assert_eq!(order.vendor_ids(), vec!["v1".to_string(), "v2".to_string()]);
        assert_eq!(order.vendor_total("v1"), Money::from_cents(74998));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.take_events().len(), 1);
    }

    #[test]
    fn test_order_rejects_empty_cart_and_blank_address() {
        let empty = Cart::for_buyer("c1");
        assert_eq!(Order::place(&empty, "Ada", CartTotals::default(), address(), "card", "t").unwrap_err(), OrderError::EmptyCart);
        let cart = two_vendor_cart();
        let mut addr = address();
        addr.city = " ".into();
        assert_eq!(Order::place(&cart, "Ada", CartTotals::default(), addr, "card", "t").unwrap_err(), OrderError::InvalidAddress(vec!["city"]));
    }

    #[test]
    fn test_order_workflow() {
        let cart = two_vendor_cart();
        let mut order = Order::place(&cart, "Ada", CartTotals::default(), address(), "card", "t").unwrap();
        assert_eq!(order.transition(OrderStatus::Processing), Ok(true));
        assert_eq!(order.transition(OrderStatus::Processing), Ok(false));
        assert_eq!(order.transition(OrderStatus::Shipped), Ok(true));
        assert!(matches!(order.transition(OrderStatus::Pending), Err(OrderError::InvalidTransition { .. })));
        assert_eq!(order.transition(OrderStatus::Delivered), Ok(true));
        assert!(matches!(order.transition(OrderStatus::Cancelled), Err(OrderError::InvalidTransition { .. })));
    }

    #[test]
    fn test_cancel_from_non_terminal() {
        assert!(OrderStatus::Pending.can_become(OrderStatus::Cancelled));
        assert!(OrderStatus::Shipped.can_become(OrderStatus::Cancelled));
        assert!(!OrderStatus::Cancelled.can_become(OrderStatus::Pending));
        assert!(!OrderStatus::Delivered.can_become(OrderStatus::Shipped));
    }
}
