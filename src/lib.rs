//! Marketplace Settlement
//!
//! Multi-vendor checkout, order ledger and vendor settlement for a marketplace storefront.
//!
//! ## Features
//! - Product catalog with vendor submission and admin moderation
//! - Buyer carts with shipping and tax totals
//! - Checkout sessions through an external payment processor
//! - Orders created only on payment confirmation
//! - Per-vendor earnings, payouts and connected payment accounts

pub mod config;
pub mod domain;
pub mod http;
pub mod payments;
pub mod services;
pub mod session;
pub mod store;

pub use config::AppConfig;
pub use session::Session;

use thiserror::Error;
use domain::aggregates::{CartError, OrderError, PayoutError, ProductError, PayoutStatus};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum MarketplaceError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Missing shipping fields: {}", .0.join(", "))]
    InvalidAddress(Vec<&'static str>),

    #[error("Invalid quantity")]
    InvalidQuantity,

    #[error("Product not found: {0}")]
    ProductNotFound(String),

    #[error("Product {0} is not available")]
    ProductUnavailable(String),

    #[error("Cart item not found")]
    ItemNotFound,

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Vendor not found: {0}")]
    VendorNotFound(String),

    #[error("Payout not found: {0}")]
    PayoutNotFound(String),

    #[error("Checkout not found: {0}")]
    CheckoutNotFound(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Insufficient earnings: requested {requested}, available {available}")]
    InsufficientEarnings { requested: String, available: String },

    #[error("Payout already {}", .0.as_str())]
    PayoutAlreadySettled(PayoutStatus),

    #[error("Vendor {0} cannot receive payouts")]
    VendorNotPayable(String),

    #[error("Payout period overlaps an earlier payout")]
    PeriodOverlap,

    #[error("Captured amount {captured} does not match expected {expected}")]
    PaymentMismatch { expected: i64, captured: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Payment session error: {0}")]
    PaymentSession(String),

    #[error("Checkout session error: {0}")]
    CheckoutSession(String),

    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, MarketplaceError>;

impl From<ProductError> for MarketplaceError {
    fn from(e: ProductError) -> Self {
        match e {
            ProductError::Invalid(m) => Self::Validation(m),
            ProductError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
        }
    }
}

impl From<CartError> for MarketplaceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::ItemNotFound,
            CartError::InvalidQuantity => Self::InvalidQuantity,
            CartError::ProductUnavailable(id) => Self::ProductUnavailable(id),
        }
    }
}

impl From<OrderError> for MarketplaceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::EmptyCart => Self::EmptyCart,
            OrderError::InvalidAddress(fields) => Self::InvalidAddress(fields),
            OrderError::InvalidTransition { .. } => Self::InvalidTransition(e.to_string()),
        }
    }
}

impl From<PayoutError> for MarketplaceError {
    fn from(e: PayoutError) -> Self {
        match e {
            PayoutError::AlreadySettled(status) => Self::PayoutAlreadySettled(status),
            PayoutError::InvalidAmount | PayoutError::InvalidPeriod | PayoutError::InvalidOutcome => Self::Validation(e.to_string()),
        }
    }
}

impl From<sqlx::Error> for MarketplaceError {
    fn from(e: sqlx::Error) -> Self { Self::StorageError(e.to_string()) }
}

impl From<sqlx::migrate::MigrateError> for MarketplaceError {
    fn from(e: sqlx::migrate::MigrateError) -> Self { Self::StorageError(e.to_string()) }
}
