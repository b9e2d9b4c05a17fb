//! Payout Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::events::{DomainEvent, PayoutEvent};
use crate::domain::value_objects::{new_id, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    id: String,
    vendor_id: String,
    /// Vendor business name at the time of the request.
    #[serde(default)]
    vendor_name: String,
    amount: Money,
    status: PayoutStatus,
    external_transfer_id: Option<String>,
    failure_reason: Option<String>,
    period: Option<PayoutPeriod>,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayoutStatus { #[default] Pending, Processed, Failed }

impl PayoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Processed => "processed", Self::Failed => "failed" }
    }
}

/// Half-open earnings window `[start, end)` a payout covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PayoutPeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, PayoutError> {
        if start >= end { return Err(PayoutError::InvalidPeriod); }
        Ok(Self { start, end })
    }
}

impl Payout {
    pub fn request(
        vendor_id: impl Into<String>, vendor_name: impl Into<String>, amount: Money, period: Option<PayoutPeriod>, note: Option<String>,
    ) -> Result<Self, PayoutError> {
        if !amount.is_positive() { return Err(PayoutError::InvalidAmount); }
        let now = Utc::now();
        let mut payout = Self {
            id: new_id(), vendor_id: vendor_id.into(), vendor_name: vendor_name.into(), amount, status: PayoutStatus::Pending,
            external_transfer_id: None, failure_reason: None, period, note, created_at: now, updated_at: now, events: vec![],
        };
        payout.raise_event(DomainEvent::Payout(PayoutEvent::Requested { payout_id: payout.id.clone(), vendor_id: payout.vendor_id.clone(), amount }));
        Ok(payout)
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn vendor_id(&self) -> &str { &self.vendor_id }
    pub fn vendor_name(&self) -> &str { &self.vendor_name }
    pub fn amount(&self) -> Money { self.amount }
    pub fn status(&self) -> PayoutStatus { self.status }
    pub fn external_transfer_id(&self) -> Option<&str> { self.external_transfer_id.as_deref() }
    pub fn failure_reason(&self) -> Option<&str> { self.failure_reason.as_deref() }
    pub fn period(&self) -> Option<PayoutPeriod> { self.period }
    pub fn note(&self) -> Option<&str> { self.note.as_deref() }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }
    pub fn is_settled(&self) -> bool { self.status != PayoutStatus::Pending }
    /// Pending and processed payouts hold their amount against the vendor's balance.
    pub fn holds_balance(&self) -> bool { self.status != PayoutStatus::Failed }

    pub fn record_transfer(&mut self, external_transfer_id: impl Into<String>) {
        let external_transfer_id = external_transfer_id.into();
        self.external_transfer_id = Some(external_transfer_id.clone());
        self.touch();
        self.raise_event(DomainEvent::Payout(PayoutEvent::TransferInitiated { payout_id: self.id.clone(), external_transfer_id }));
    }

    /// Moves a pending payout to its terminal status. Settled payouts are never changed.
    pub fn settle(&mut self, outcome: PayoutStatus, reason: Option<String>) -> Result<(), PayoutError> {
        if self.is_settled() { return Err(PayoutError::AlreadySettled(self.status)); }
        match outcome {
            PayoutStatus::Pending => return Err(PayoutError::InvalidOutcome),
            PayoutStatus::Processed => {
                self.raise_event(DomainEvent::Payout(PayoutEvent::Processed { payout_id: self.id.clone(), vendor_id: self.vendor_id.clone(), amount: self.amount }));
            }
            PayoutStatus::Failed => {
                let reason = reason.unwrap_or_else(|| "transfer failed".to_string());
                self.failure_reason = Some(reason.clone());
                self.raise_event(DomainEvent::Payout(PayoutEvent::Failed { payout_id: self.id.clone(), vendor_id: self.vendor_id.clone(), reason }));
            }
        }
        self.status = outcome;
        self.touch();
        Ok(())
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutError { InvalidAmount, InvalidPeriod, InvalidOutcome, AlreadySettled(PayoutStatus) }
impl std::error::Error for PayoutError {}
impl std::fmt::Display for PayoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "Payout amount must be greater than zero"),
            Self::InvalidPeriod => write!(f, "Payout period must end after it starts"),
            Self::InvalidOutcome => write!(f, "A payout can only settle as processed or failed"),
            Self::AlreadySettled(s) => write!(f, "Payout already {}", s.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_payout_settles_once() {
        let mut p = Payout::request("v1", "TurboTech", Money::from_cents(140848), None, None).unwrap();
        p.settle(PayoutStatus::Processed, None).unwrap();
        assert_eq!(p.settle(PayoutStatus::Failed, Some("late".into())), Err(PayoutError::AlreadySettled(PayoutStatus::Processed)));
        assert_eq!(p.status(), PayoutStatus::Processed);
        assert_eq!(p.vendor_name(), "TurboTech");
        assert_eq!(p.failure_reason(), None);
    }

    #[test]
    fn test_failed_payout_keeps_reason() {
        let mut p = Payout::request("v1", "TurboTech", Money::from_cents(500), None, None).unwrap();
        p.settle(PayoutStatus::Failed, Some("account closed".into())).unwrap();
        assert_eq!(p.failure_reason(), Some("account closed"));
        assert!(!p.holds_balance());
        assert!(p.settle(PayoutStatus::Processed, None).is_err());
    }

    #[test]
    fn test_request_validation() {
        assert_eq!(Payout::request("v1", "TurboTech", Money::ZERO, None, None).unwrap_err(), PayoutError::InvalidAmount);
        let now = Utc::now();
        assert_eq!(PayoutPeriod::new(now, now - Duration::days(1)).unwrap_err(), PayoutError::InvalidPeriod);
        let mut p = Payout::request("v1", "TurboTech", Money::from_cents(1), None, None).unwrap();
        assert_eq!(p.settle(PayoutStatus::Pending, None), Err(PayoutError::InvalidOutcome));
    }
}
