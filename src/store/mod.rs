//! Persistence for marketplace records.
//!
//! Every read returns a `Result`; an empty list means "nothing stored", never "the
//! query failed".

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use crate::domain::aggregates::{Cart, Checkout, Order, Payout, Product, Vendor};
use crate::Result;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Outcome of committing an order for a `(customer, source token)` pair.
#[derive(Debug)]
pub enum OrderPlacement {
    Created(Order),
    /// An order already exists for the pair; nothing was written.
    Existing(Order),
}

#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    async fn insert_product(&self, product: &Product) -> Result<()>;
    async fn save_product(&self, product: &Product) -> Result<()>;
    async fn product(&self, id: &str) -> Result<Option<Product>>;
    /// All products in insertion order.
    async fn products(&self) -> Result<Vec<Product>>;

    async fn cart(&self, buyer_id: &str) -> Result<Option<Cart>>;
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    async fn checkout(&self, token: &str) -> Result<Option<Checkout>>;
    async fn save_checkout(&self, checkout: &Checkout) -> Result<()>;

    /// Inserts `order` unless one exists for its `(customer_id, source_token)`, and in the
    /// same step empties the buyer's stored cart if it still carries that token.
    async fn place_order(&self, order: &Order) -> Result<OrderPlacement>;
    async fn save_order(&self, order: &Order) -> Result<()>;
    async fn order(&self, id: &str) -> Result<Option<Order>>;
    /// All orders in creation order.
    async fn orders(&self) -> Result<Vec<Order>>;
    async fn customer_orders(&self, customer_id: &str) -> Result<Vec<Order>>;
    /// Orders with at least one line owned by `vendor_id`.
    async fn vendor_orders(&self, vendor_id: &str) -> Result<Vec<Order>>;

    async fn save_vendor(&self, vendor: &Vendor) -> Result<()>;
    async fn vendor(&self, id: &str) -> Result<Option<Vendor>>;
    async fn vendor_by_account(&self, external_account_id: &str) -> Result<Option<Vendor>>;
    async fn vendors(&self) -> Result<Vec<Vendor>>;

    async fn insert_payout(&self, payout: &Payout) -> Result<()>;
    async fn save_payout(&self, payout: &Payout) -> Result<()>;
    async fn payout(&self, id: &str) -> Result<Option<Payout>>;
    async fn payout_by_transfer(&self, external_transfer_id: &str) -> Result<Option<Payout>>;
    /// Payouts in creation order, optionally limited to one vendor.
    async fn payouts(&self, vendor_id: Option<&str>) -> Result<Vec<Payout>>;
}
