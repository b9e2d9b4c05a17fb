//! Checkout Aggregate
//!
//! A checkout records everything needed to place the order once the processor confirms
//! payment. It is keyed by the cart's checkout token, which doubles as the idempotency
//! key for the external session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::aggregates::cart::{Cart, CartTotals};
use crate::domain::settlement::ChargeGroup;
use crate::domain::value_objects::Address;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus { #[default] Open, Completed }

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    token: String,
    buyer_id: String,
    buyer_name: String,
    buyer_email: String,
    cart: Cart,
    totals: CartTotals,
    shipping_address: Address,
    payment_method: String,
    charge_groups: Vec<ChargeGroup>,
    session_id: String,
    redirect_url: String,
    status: CheckoutStatus,
    order_id: Option<String>,
    created_at: DateTime<Utc>,
}

/// Buyer-facing input gathered on the checkout form.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    pub shipping_address: Address,
    pub buyer_email: String,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_payment_method() -> String { "card".to_string() }

impl Checkout {
    pub fn open(
        cart: Cart, buyer_name: impl Into<String>, details: CheckoutDetails, totals: CartTotals,
        charge_groups: Vec<ChargeGroup>, session_id: impl Into<String>, redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            token: cart.checkout_token().to_string(), buyer_id: cart.buyer_id().to_string(), buyer_name: buyer_name.into(),
            buyer_email: details.buyer_email, cart, totals, shipping_address: details.shipping_address,
            payment_method: details.payment_method, charge_groups, session_id: session_id.into(),
            redirect_url: redirect_url.into(), status: CheckoutStatus::Open, order_id: None, created_at: Utc::now(),
        }
    }

    pub fn token(&self) -> &str { &self.token }
    pub fn buyer_id(&self) -> &str { &self.buyer_id }
    pub fn buyer_name(&self) -> &str { &self.buyer_name }
    pub fn buyer_email(&self) -> &str { &self.buyer_email }
    pub fn cart(&self) -> &Cart { &self.cart }
    pub fn totals(&self) -> CartTotals { self.totals }
    pub fn shipping_address(&self) -> &Address { &self.shipping_address }
    pub fn payment_method(&self) -> &str { &self.payment_method }
    pub fn charge_groups(&self) -> &[ChargeGroup] { &self.charge_groups }
    pub fn session_id(&self) -> &str { &self.session_id }
    pub fn redirect_url(&self) -> &str { &self.redirect_url }
    pub fn status(&self) -> CheckoutStatus { self.status }
    pub fn order_id(&self) -> Option<&str> { self.order_id.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }

    pub fn complete(&mut self, order_id: impl Into<String>) {
        self.status = CheckoutStatus::Completed;
        self.order_id = Some(order_id.into());
    }
}
