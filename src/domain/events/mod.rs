//! Domain events and their publication.
use crate::domain::value_objects::Money;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Payout(PayoutEvent),
    Vendor(VendorEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(_) => "marketplace.product",
            Self::Order(_) => "marketplace.order",
            Self::Payout(_) => "marketplace.payout",
            Self::Vendor(_) => "marketplace.vendor",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Submitted { product_id: String, vendor_id: String },
    Approved { product_id: String },
    Rejected { product_id: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum OrderEvent {
    Created { order_id: String, customer_id: String, total: Money, vendor_ids: Vec<String> },
    StatusChanged { order_id: String, from: String, to: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PayoutEvent {
    Requested { payout_id: String, vendor_id: String, amount: Money },
    TransferInitiated { payout_id: String, external_transfer_id: String },
    Processed { payout_id: String, vendor_id: String, amount: Money },
    Failed { payout_id: String, vendor_id: String, reason: String },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VendorEvent {
    AccountLinked { vendor_id: String, external_account_id: String },
    AccountStatusChanged { vendor_id: String, status: String },
}

/// Fans domain events out to NATS when a client is configured; logs them otherwise.
///
/// Publication is best effort: a failed publish is logged and never fails the
/// operation that raised the event.
#[derive(Clone, Default)]
pub struct EventBus {
    nats: Option<async_nats::Client>,
}

impl EventBus {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }
    pub fn disabled() -> Self { Self::default() }

    pub async fn publish_all(&self, events: Vec<DomainEvent>) {
        for event in events {
            self.publish(event).await;
        }
    }

    pub async fn publish(&self, event: DomainEvent) {
        let Some(client) = &self.nats else {
            tracing::debug!(subject = event.subject(), ?event, "domain event (no broker configured)");
            return;
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(error = %e, ?event, "failed to encode domain event");
                return;
            }
        };
        if let Err(e) = client.publish(event.subject().to_string(), payload.into()).await {
            tracing::warn!(error = %e, subject = event.subject(), "failed to publish domain event");
        }
    }
}
