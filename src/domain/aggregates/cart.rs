//! Cart Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::product::Product;
use crate::domain::value_objects::{new_id, Money, Quantity};

/// A buyer's cart. One per buyer, persisted under the buyer id.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    buyer_id: String,
    items: Vec<CartItem>,
    checkout_token: String,
    updated_at: DateTime<Utc>,
}

/// Snapshot of an approved product plus quantity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub name: String,
    pub unit_price: Money,
    pub vendor_id: String,
    pub vendor_name: String,
    pub quantity: Quantity,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.unit_price * self.quantity }
}

/// Shipping and tax rules applied to a cart subtotal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PricingPolicy {
    pub shipping_fee: Money,
    pub free_shipping_threshold: Money,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self { shipping_fee: Money::from_cents(1599), free_shipping_threshold: Money::from_cents(10000), tax_rate: Decimal::new(8, 2) }
    }
}

impl PricingPolicy {
    pub fn totals_for(&self, subtotal: Money) -> CartTotals {
        if subtotal == Money::ZERO {
            return CartTotals::default();
        }
        let shipping = if subtotal > self.free_shipping_threshold { Money::ZERO } else { self.shipping_fee };
        let tax = subtotal.scale(self.tax_rate).round_cents();
        CartTotals { subtotal, shipping, tax, total: subtotal + shipping + tax }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CartTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub tax: Money,
    pub total: Money,
}

impl Cart {
    pub fn for_buyer(buyer_id: impl Into<String>) -> Self {
        Self { buyer_id: buyer_id.into(), items: vec![], checkout_token: new_id(), updated_at: Utc::now() }
    }

    pub fn buyer_id(&self) -> &str { &self.buyer_id }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    /// Idempotency key for checking out the cart as it currently stands.
    pub fn checkout_token(&self) -> &str { &self.checkout_token }
    pub fn subtotal(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }
    pub fn totals(&self, policy: &PricingPolicy) -> CartTotals { policy.totals_for(self.subtotal()) }

    /// Adds one unit of `product`, merging with an existing line.
    pub fn add_product(&mut self, product: &Product) -> Result<(), CartError> {
        if !product.is_approved() { return Err(CartError::ProductUnavailable(product.id().to_string())); }
        let mut items = self.items.clone();
        if let Some(existing) = items.iter_mut().find(|i| i.product_id == product.id()) {
            existing.quantity = existing.quantity.increment();
        } else {
            items.push(CartItem {
                product_id: product.id().to_string(), name: product.name().to_string(), unit_price: product.price(),
                vendor_id: product.vendor_id().to_string(), vendor_name: product.vendor_name().to_string(), quantity: Quantity::ONE,
            });
        }
        self.replace_items(items)
    }

    /// Sets the quantity of a line; anything below 1 removes it.
    pub fn update_quantity(&mut self, product_id: &str, quantity: i64) -> Result<(), CartError> {
        if quantity < 1 { return self.remove_item(product_id); }
        let qty = u32::try_from(quantity).ok().and_then(|q| Quantity::new(q).ok()).ok_or(CartError::InvalidQuantity)?;
        let mut items = self.items.clone();
        let item = items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        item.quantity = qty;
        self.replace_items(items)
    }

    pub fn remove_item(&mut self, product_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        self.changed();
        Ok(())
    }

    pub fn clear(&mut self) { self.items.clear(); self.changed(); }

    /// Commits `items` only if the subtotal stays representable in minor units.
    fn replace_items(&mut self, items: Vec<CartItem>) -> Result<(), CartError> {
        let subtotal = items
            .iter()
            .try_fold(Money::ZERO, |acc, i| i.unit_price.checked_times(i.quantity).and_then(|line| acc.checked_add(line)));
        if subtotal.and_then(|s| s.to_minor_units()).is_none() { return Err(CartError::InvalidQuantity); }
        self.items = items;
        self.changed();
        Ok(())
    }

    fn changed(&mut self) {
        self.checkout_token = new_id();
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity, ProductUnavailable(String) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Invalid quantity"),
            Self::ProductUnavailable(id) => write!(f, "Product {id} is not available"),
        }
    }
}

#[cfg(test)]
pub(crate) fn approved(name: &str, cents: i64, vendor: &str) -> Product {
    let mut p = Product::submit(crate::domain::aggregates::product::draft(name, Decimal::new(cents, 2), "performance"), vendor, format!("{vendor} shop")).unwrap();
    p.approve().unwrap();
    p
}
