//! Vendor Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::events::{DomainEvent, VendorEvent};

/// A seller and the state of its connected payment account.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vendor {
    id: String,
    user_id: String,
    business_name: String,
    email: String,
    external_account_id: Option<String>,
    account_status: AccountStatus,
    charges_enabled: bool,
    payouts_enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus { #[default] Pending, Active, Rejected }

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self { Self::Pending => "pending", Self::Active => "active", Self::Rejected => "rejected" }
    }
}

impl Vendor {
    pub fn register(id: impl Into<String>, user_id: impl Into<String>, business_name: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(), user_id: user_id.into(), business_name: business_name.into(), email: email.into(),
            external_account_id: None, account_status: AccountStatus::Pending, charges_enabled: false, payouts_enabled: false,
            created_at: now, updated_at: now, events: vec![],
        }
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn user_id(&self) -> &str { &self.user_id }
    pub fn business_name(&self) -> &str { &self.business_name }
    pub fn email(&self) -> &str { &self.email }
    pub fn external_account_id(&self) -> Option<&str> { self.external_account_id.as_deref() }
    pub fn account_status(&self) -> AccountStatus { self.account_status }
    pub fn charges_enabled(&self) -> bool { self.charges_enabled }
    pub fn payouts_enabled(&self) -> bool { self.payouts_enabled }
    pub fn created_at(&self) -> DateTime<Utc> { self.created_at }
    pub fn updated_at(&self) -> DateTime<Utc> { self.updated_at }

    /// Payouts need an active account with payouts enabled.
    pub fn is_payable(&self) -> bool {
        self.account_status == AccountStatus::Active && self.payouts_enabled && self.external_account_id.is_some()
    }

    /// Records the processor account. An existing account id is never replaced.
    pub fn link_account(&mut self, external_account_id: impl Into<String>) -> bool {
        if self.external_account_id.is_some() { return false; }
        let external_account_id = external_account_id.into();
        self.external_account_id = Some(external_account_id.clone());
        self.account_status = AccountStatus::Pending;
        self.touch();
        self.raise_event(DomainEvent::Vendor(VendorEvent::AccountLinked { vendor_id: self.id.clone(), external_account_id }));
        true
    }

    /// Applies a processor-side account update.
    pub fn apply_account_update(&mut self, status: AccountStatus, charges_enabled: bool, payouts_enabled: bool) {
        let changed = self.account_status != status;
        self.account_status = status;
        self.charges_enabled = charges_enabled;
        self.payouts_enabled = payouts_enabled;
        self.touch();
        if changed {
            self.raise_event(DomainEvent::Vendor(VendorEvent::AccountStatusChanged { vendor_id: self.id.clone(), status: status.as_str().into() }));
        }
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}
