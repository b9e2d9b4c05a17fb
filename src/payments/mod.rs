//! External payment processor boundary.
//!
//! The processor hosts checkout pages, owns vendors' connected accounts and moves money
//! out through transfers. Every request carries an idempotency key scoped to the logical
//! operation so callers can safely re-invoke after a timeout.

pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use crate::domain::value_objects::Address;

pub use simulated::SimulatedGateway;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    pub unit_amount_minor: i64,
    pub quantity: u32,
    pub vendor_id: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionMetadata {
    pub vendor_ids: Vec<String>,
    pub buyer_id: String,
    pub checkout_token: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CheckoutSessionRequest {
    pub idempotency_key: String,
    pub line_items: Vec<SessionLineItem>,
    pub shipping_minor: i64,
    pub tax_minor: i64,
    pub currency: String,
    pub buyer_email: String,
    pub shipping_address: Address,
    pub metadata: SessionMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutSessionRequest {
    /// Amount the processor will capture, in minor units. `None` if it does not fit `i64`.
    pub fn amount_minor(&self) -> Option<i64> {
        self.line_items
            .iter()
            .try_fold(0i64, |acc, l| l.unit_amount_minor.checked_mul(i64::from(l.quantity)).and_then(|line| acc.checked_add(line)))?
            .checked_add(self.shipping_minor)?
            .checked_add(self.tax_minor)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub redirect_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AccountRequest {
    pub idempotency_key: String,
    pub vendor_user_id: String,
    pub vendor_email: String,
    pub business_name: String,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TransferRequest {
    pub idempotency_key: String,
    pub external_account_id: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    #[error("processor rejected the request: {0}")]
    Rejected(String),

    #[error("processor unavailable: {0}")]
    Unavailable(String),

    #[error("processor did not answer within {0:?}")]
    Timeout(Duration),
}

pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(&self, request: CheckoutSessionRequest) -> GatewayResult<CheckoutSession>;

    /// Returns the processor's id for the new connected account.
    async fn create_connected_account(&self, request: AccountRequest) -> GatewayResult<String>;

    /// Returns a hosted onboarding URL for an existing connected account.
    async fn create_onboarding_link(&self, external_account_id: &str) -> GatewayResult<String>;

    /// Returns the processor's transfer id.
    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<String>;
}

/// Runs a gateway call under `limit`. An elapsed timer is terminal for this attempt.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> GatewayResult<T>
where
    F: std::future::Future<Output = GatewayResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(GatewayError::Timeout(limit)),
    }
}
