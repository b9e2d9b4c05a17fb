use std::sync::Arc;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use crate::domain::aggregates::{AccountStatus, Payout, PayoutPeriod, PayoutStatus, Vendor};
use crate::domain::events::EventBus;
use crate::domain::settlement::{self, VendorEarnings};
use crate::domain::value_objects::Money;
use crate::payments::{with_timeout, AccountRequest, PaymentGateway, TransferRequest};
use crate::services::locks::KeyedLocks;
use crate::session::Session;
use crate::store::MarketplaceStore;
use crate::{MarketplaceError, Result};

/// Admin input for a new payout.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutRequest {
    pub vendor_id: String,
    pub amount: Money,
    pub period_start: Option<DateTime<Utc>>,
    pub period_end: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl PayoutRequest {
    fn period(&self) -> Result<Option<PayoutPeriod>> {
        match (self.period_start, self.period_end) {
            (None, None) => Ok(None),
            (Some(start), Some(end)) => Ok(Some(PayoutPeriod::new(start, end)?)),
            _ => Err(MarketplaceError::Validation("payout period needs both a start and an end".into())),
        }
    }
}

/// Result of connecting a vendor's payment account.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLink {
    pub vendor_id: String,
    pub external_account_id: String,
    /// Hosted onboarding page; `None` once the account is already active.
    pub onboarding_url: Option<String>,
}

/// Vendor earnings, payouts and connected payment accounts.
#[derive(Clone)]
pub struct SettlementEngine {
    store: Arc<dyn MarketplaceStore>,
    gateway: Arc<dyn PaymentGateway>,
    events: EventBus,
    vendor_locks: Arc<KeyedLocks>,
    currency: String,
    timeout: Duration,
}

impl SettlementEngine {
    pub fn new(store: Arc<dyn MarketplaceStore>, gateway: Arc<dyn PaymentGateway>, events: EventBus, currency: impl Into<String>, timeout: Duration) -> Self {
        Self { store, gateway, events, vendor_locks: Arc::new(KeyedLocks::new()), currency: currency.into(), timeout }
    }

    pub async fn vendor_earnings(&self, vendor_id: &str) -> Result<VendorEarnings> {
        let orders = self.store.vendor_orders(vendor_id).await?;
        let payouts = self.store.payouts(Some(vendor_id)).await?;
        Ok(settlement::vendor_earnings(vendor_id, &orders, &payouts))
    }

    /// Creates a pending payout and asks the processor to move the money.
    ///
    /// Balance check and insert happen under the vendor's lock, so concurrent requests
    /// cannot jointly overdraw. A failed or timed-out transfer leaves the payout `failed`,
    /// which releases its hold on the balance.
    #[instrument(skip(self, session, request), fields(vendor_id = %request.vendor_id, amount = %request.amount))]
    pub async fn create_payout(&self, session: &Session, request: PayoutRequest) -> Result<Payout> {
        session.require_admin()?;
        if !request.amount.is_positive() {
            return Err(MarketplaceError::Validation("payout amount must be greater than zero".into()));
        }
        let period = request.period()?;
        let vendor_id = request.vendor_id.as_str();

        let _guard = self.vendor_locks.lock(vendor_id).await;
        let vendor = self.get_vendor(vendor_id).await?;
        let account = match vendor.external_account_id() {
            Some(account) if vendor.is_payable() => account.to_string(),
            _ => return Err(MarketplaceError::VendorNotPayable(vendor_id.to_string())),
        };

        let orders = self.store.vendor_orders(vendor_id).await?;
        let payouts = self.store.payouts(Some(vendor_id)).await?;
        let earnings = settlement::vendor_earnings(vendor_id, &orders, &payouts);
        if request.amount > earnings.available_for_payout {
            return Err(MarketplaceError::InsufficientEarnings {
                requested: request.amount.to_string(),
                available: earnings.available_for_payout.to_string(),
            });
        }
        if period.as_ref().is_some_and(|p| settlement::period_conflicts(p, &payouts)) {
            return Err(MarketplaceError::PeriodOverlap);
        }
        let amount_minor = request.amount.to_minor_units().ok_or_else(|| MarketplaceError::Validation("payout amount out of range".into()))?;

        let mut payout = Payout::request(vendor_id, vendor.business_name(), request.amount, period, request.note)?;
        self.store.insert_payout(&payout).await?;

        let transfer = TransferRequest { idempotency_key: payout.id().to_string(), external_account_id: account, amount_minor, currency: self.currency.clone() };
        match with_timeout(self.timeout, self.gateway.create_transfer(transfer)).await {
            Ok(transfer_id) => {
                info!(payout_id = payout.id(), transfer_id = %transfer_id, "transfer initiated");
                payout.record_transfer(transfer_id);
            }
            Err(e) => {
                warn!(payout_id = payout.id(), error = %e, "transfer failed");
                payout.settle(PayoutStatus::Failed, Some(e.to_string()))?;
            }
        }
        self.store.save_payout(&payout).await?;
        self.events.publish_all(payout.take_events()).await;
        Ok(payout)
    }

    /// Settles a pending payout as processed or failed. Settled payouts never change.
    pub async fn update_payout_status(&self, session: &Session, payout_id: &str, status: PayoutStatus) -> Result<Payout> {
        session.require_admin()?;
        let payout = self.get_payout(payout_id).await?;
        self.settle(payout, status, None).await
    }

    /// Processor notification that a transfer finished. A redelivered notification with the
    /// same outcome is acknowledged without changes.
    #[instrument(skip(self))]
    pub async fn transfer_settled(&self, external_transfer_id: &str, outcome: PayoutStatus, reason: Option<String>) -> Result<Payout> {
        let payout = self
            .store
            .payout_by_transfer(external_transfer_id)
            .await?
            .ok_or_else(|| MarketplaceError::PayoutNotFound(external_transfer_id.to_string()))?;
        if payout.status() == outcome {
            return Ok(payout);
        }
        self.settle(payout, outcome, reason).await
    }

    async fn settle(&self, payout: Payout, outcome: PayoutStatus, reason: Option<String>) -> Result<Payout> {
        let _guard = self.vendor_locks.lock(payout.vendor_id()).await;
        let mut payout = self.get_payout(payout.id()).await?;
        payout.settle(outcome, reason)?;
        self.store.save_payout(&payout).await?;
        info!(payout_id = payout.id(), status = outcome.as_str(), "payout settled");
        self.events.publish_all(payout.take_events()).await;
        Ok(payout)
    }

    /// Creates the vendor record and its processor account on first use, then returns an
    /// onboarding link. An existing account id is always reused.
    #[instrument(skip(self, session), fields(user_id = session.user_id()))]
    pub async fn connect_vendor_account(&self, session: &Session) -> Result<AccountLink> {
        let seller = session.seller()?;
        let _guard = self.vendor_locks.lock(seller.vendor_id).await;
        let mut vendor = match self.store.vendor(seller.vendor_id).await? {
            Some(v) => v,
            None => Vendor::register(seller.vendor_id, seller.user_id, seller.business_name, seller.email),
        };

        let account = match vendor.external_account_id() {
            Some(account) => account.to_string(),
            None => {
                let request = AccountRequest {
                    idempotency_key: vendor.id().to_string(),
                    vendor_user_id: vendor.user_id().to_string(),
                    vendor_email: vendor.email().to_string(),
                    business_name: vendor.business_name().to_string(),
                };
                let account = with_timeout(self.timeout, self.gateway.create_connected_account(request))
                    .await
                    .map_err(|e| MarketplaceError::Gateway(e.to_string()))?;
                vendor.link_account(account.clone());
                info!(vendor_id = vendor.id(), account = %account, "connected account created");
                account
            }
        };
        self.store.save_vendor(&vendor).await?;
        self.events.publish_all(vendor.take_events()).await;

        if vendor.account_status() == AccountStatus::Active {
            return Ok(AccountLink { vendor_id: vendor.id().to_string(), external_account_id: account, onboarding_url: None });
        }
        let url = with_timeout(self.timeout, self.gateway.create_onboarding_link(&account))
            .await
            .map_err(|e| MarketplaceError::Gateway(e.to_string()))?;
        Ok(AccountLink { vendor_id: vendor.id().to_string(), external_account_id: account, onboarding_url: Some(url) })
    }

    /// Processor notification that a connected account changed.
    #[instrument(skip(self))]
    pub async fn account_status_changed(&self, external_account_id: &str, status: AccountStatus, charges_enabled: bool, payouts_enabled: bool) -> Result<Vendor> {
        let vendor_id = self
            .store
            .vendor_by_account(external_account_id)
            .await?
            .map(|v| v.id().to_string())
            .ok_or_else(|| MarketplaceError::VendorNotFound(external_account_id.to_string()))?;
        let _guard = self.vendor_locks.lock(&vendor_id).await;
        let mut vendor = self.get_vendor(&vendor_id).await?;
        vendor.apply_account_update(status, charges_enabled, payouts_enabled);
        self.store.save_vendor(&vendor).await?;
        info!(vendor_id = vendor.id(), status = status.as_str(), payouts_enabled, "vendor account updated");
        self.events.publish_all(vendor.take_events()).await;
        Ok(vendor)
    }

    pub async fn list_payouts(&self, vendor_id: Option<&str>) -> Result<Vec<Payout>> {
        self.store.payouts(vendor_id).await
    }

    pub async fn get_vendor(&self, vendor_id: &str) -> Result<Vendor> {
        self.store.vendor(vendor_id).await?.ok_or_else(|| MarketplaceError::VendorNotFound(vendor_id.to_string()))
    }

    pub async fn get_payout(&self, payout_id: &str) -> Result<Payout> {
        self.store.payout(payout_id).await?.ok_or_else(|| MarketplaceError::PayoutNotFound(payout_id.to_string()))
    }
}
