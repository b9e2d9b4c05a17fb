//! In-process payment processor used when no live processor is wired in, and by tests.
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;
use super::{AccountRequest, CheckoutSession, CheckoutSessionRequest, GatewayError, GatewayResult, PaymentGateway, TransferRequest};

#[derive(Default)]
struct Ledger {
    sessions: HashMap<String, CheckoutSession>,
    accounts: HashMap<String, String>,
    transfers: HashMap<String, String>,
    transfer_amounts: HashMap<String, i64>,
    fail_next_checkout: Option<String>,
    omit_redirect: bool,
    frozen_accounts: HashSet<String>,
}

/// Simulates a hosted processor. Requests are replayed by idempotency key: a repeated key
/// returns the first result without creating anything new.
pub struct SimulatedGateway {
    hosted_base_url: String,
    latency: Duration,
    ledger: Mutex<Ledger>,
}

impl Default for SimulatedGateway {
    fn default() -> Self { Self::new("https://checkout.simulated.local") }
}

impl SimulatedGateway {
    pub fn new(hosted_base_url: impl Into<String>) -> Self {
        Self { hosted_base_url: hosted_base_url.into(), latency: Duration::ZERO, ledger: Mutex::new(Ledger::default()) }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self { self.latency = latency; self }

    /// The next new checkout session request fails with `reason`.
    pub fn fail_next_checkout(&self, reason: impl Into<String>) { self.ledger().fail_next_checkout = Some(reason.into()); }

    /// Sessions are created without a redirect target.
    pub fn omit_redirects(&self) { self.ledger().omit_redirect = true; }

    /// Transfers to `external_account_id` are rejected.
    pub fn freeze_account(&self, external_account_id: impl Into<String>) { self.ledger().frozen_accounts.insert(external_account_id.into()); }

    pub fn sessions_created(&self) -> usize { self.ledger().sessions.len() }
    pub fn accounts_created(&self) -> usize { self.ledger().accounts.len() }
    pub fn transfers_created(&self) -> usize { self.ledger().transfers.len() }
    /// Total minor units transferred to `external_account_id`.
    pub fn transferred_to(&self, external_account_id: &str) -> i64 {
        self.ledger().transfer_amounts.get(external_account_id).copied().unwrap_or(0)
    }

    fn ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn network(&self) {
        if !self.latency.is_zero() { tokio::time::sleep(self.latency).await; }
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    #[instrument(skip(self, request), fields(key = %request.idempotency_key, amount = ?request.amount_minor()))]
    async fn create_checkout_session(&self, request: CheckoutSessionRequest) -> GatewayResult<CheckoutSession> {
        self.network().await;
        let mut ledger = self.ledger();
        if let Some(existing) = ledger.sessions.get(&request.idempotency_key) {
            info!("replaying checkout session {}", existing.session_id);
            return Ok(existing.clone());
        }
        match request.amount_minor() {
            Some(amount) if amount > 0 && !request.line_items.is_empty() => {}
            Some(_) => return Err(GatewayError::Rejected("amount must be greater than zero".into())),
            None => return Err(GatewayError::Rejected("amount out of range".into())),
        }
        if let Some(reason) = ledger.fail_next_checkout.take() {
            return Err(GatewayError::Unavailable(reason));
        }
        let session_id = format!("cs_sim_{}", Uuid::new_v4().simple());
        let redirect_url = (!ledger.omit_redirect).then(|| format!("{}/pay/{}", self.hosted_base_url, session_id));
        let session = CheckoutSession { session_id, redirect_url };
        ledger.sessions.insert(request.idempotency_key, session.clone());
        info!("created checkout session {}", session.session_id);
        Ok(session)
    }

    #[instrument(skip(self, request), fields(key = %request.idempotency_key))]
    async fn create_connected_account(&self, request: AccountRequest) -> GatewayResult<String> {
        self.network().await;
        let mut ledger = self.ledger();
        let account = ledger
            .accounts
            .entry(request.idempotency_key)
            .or_insert_with(|| format!("acct_sim_{}", Uuid::new_v4().simple()))
            .clone();
        info!(business = %request.business_name, "connected account {account}");
        Ok(account)
    }

    async fn create_onboarding_link(&self, external_account_id: &str) -> GatewayResult<String> {
        self.network().await;
        Ok(format!("{}/onboard/{}", self.hosted_base_url, external_account_id))
    }

    #[instrument(skip(self, request), fields(key = %request.idempotency_key, account = %request.external_account_id, amount = request.amount_minor))]
    async fn create_transfer(&self, request: TransferRequest) -> GatewayResult<String> {
        self.network().await;
        let mut ledger = self.ledger();
        if let Some(existing) = ledger.transfers.get(&request.idempotency_key) {
            return Ok(existing.clone());
        }
        if request.amount_minor <= 0 {
            return Err(GatewayError::Rejected("transfer amount must be positive".into()));
        }
        if ledger.frozen_accounts.contains(&request.external_account_id) {
            return Err(GatewayError::Rejected(format!("account {} cannot receive transfers", request.external_account_id)));
        }
        let transfer_id = format!("tr_sim_{}", Uuid::new_v4().simple());
        ledger.transfers.insert(request.idempotency_key, transfer_id.clone());
        *ledger.transfer_amounts.entry(request.external_account_id).or_insert(0) += request.amount_minor;
        info!("created transfer {transfer_id}");
        Ok(transfer_id)
    }
}
