//! Shared test harness for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use xcredits_core::{
    Account, CreditTransaction, OrderStatus, PaymentOrder, PricingRule, RedeemCode,
    RedeemCodeUsage, RegistrationId, RegistrationStatus, TransactionId, UserId, UserRegistration,
    VerificationCode, VerificationPurpose,
};
use xcredits_engine::{
    Acknowledgement, CheckoutPayload, Engines, GatewayError, ManualClock, OrderConfig,
    PaymentGateways, PaymentProvider, RefundOutcome, VerifiedCallback,
};
use xcredits_store::{MemoryStore, Store, StoreError};

pub const STUB_PROVIDER: &str = "stub";

/// Runs against the inner store just before the next redeem code write.
pub type RedeemWriteHook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// A [`MemoryStore`] whose ledger commits can be made to fail and whose
/// redeem code writes can have another write slipped in ahead of them.
#[derive(Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    fail_ledger: AtomicBool,
    before_redeem_write: Mutex<Option<RedeemWriteHook>>,
}

impl FaultyStore {
    pub fn fail_ledger_commits(&self, fail: bool) {
        self.fail_ledger.store(fail, Ordering::SeqCst);
    }

    /// Run `hook` once, between the caller's read and its next redeem code write.
    pub fn interleave_before_redeem_write(&self, hook: impl FnOnce(&MemoryStore) + Send + 'static) {
        *self.before_redeem_write.lock().unwrap() = Some(Box::new(hook));
    }
}

impl Store for FaultyStore {
    fn get_account(&self, user_id: &UserId) -> xcredits_store::Result<Option<Account>> {
        self.inner.get_account(user_id)
    }
    fn create_account_if_absent(&self, account: &Account) -> xcredits_store::Result<Account> {
        self.inner.create_account_if_absent(account)
    }
    fn commit_ledger_entry(
        &self,
        expected_version: u64,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> xcredits_store::Result<()> {
        if self.fail_ledger.load(Ordering::SeqCst) {
            return Err(StoreError::Database("injected failure".into()));
        }
        self.inner
            .commit_ledger_entry(expected_version, account, transaction)
    }
    fn get_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> xcredits_store::Result<Option<CreditTransaction>> {
        self.inner.get_transaction(transaction_id)
    }
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<CreditTransaction>> {
        self.inner.list_transactions_by_user(user_id, limit, offset)
    }
    fn count_transactions_by_user(&self, user_id: &UserId) -> xcredits_store::Result<u64> {
        self.inner.count_transactions_by_user(user_id)
    }
    fn put_pricing_rule(&self, rule: &PricingRule) -> xcredits_store::Result<()> {
        self.inner.put_pricing_rule(rule)
    }
    fn get_pricing_rule(&self, path: &str) -> xcredits_store::Result<Option<PricingRule>> {
        self.inner.get_pricing_rule(path)
    }
    fn get_pricing_rules(
        &self,
        paths: &[&str],
    ) -> xcredits_store::Result<Vec<Option<PricingRule>>> {
        self.inner.get_pricing_rules(paths)
    }
    fn list_pricing_rules(
        &self,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<PricingRule>> {
        self.inner.list_pricing_rules(limit, offset)
    }
    fn count_pricing_rules(&self) -> xcredits_store::Result<u64> {
        self.inner.count_pricing_rules()
    }
    fn insert_redeem_code(&self, code: &RedeemCode) -> xcredits_store::Result<()> {
        self.inner.insert_redeem_code(code)
    }
    fn get_redeem_code(&self, code: &str) -> xcredits_store::Result<Option<RedeemCode>> {
        self.inner.get_redeem_code(code)
    }
    fn update_redeem_code(
        &self,
        expected_version: u64,
        code: &RedeemCode,
        usage: Option<&RedeemCodeUsage>,
    ) -> xcredits_store::Result<()> {
        let hook = self.before_redeem_write.lock().unwrap().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }
        self.inner.update_redeem_code(expected_version, code, usage)
    }
    fn list_redeem_codes(
        &self,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<RedeemCode>> {
        self.inner.list_redeem_codes(limit, offset)
    }
    fn count_redeem_codes(&self) -> xcredits_store::Result<u64> {
        self.inner.count_redeem_codes()
    }
    fn list_redeem_code_usages(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<RedeemCodeUsage>> {
        self.inner.list_redeem_code_usages(code, limit, offset)
    }
    fn count_redeem_code_usages(&self, code: &str) -> xcredits_store::Result<u64> {
        self.inner.count_redeem_code_usages(code)
    }
    fn insert_order(&self, order: &PaymentOrder) -> xcredits_store::Result<()> {
        self.inner.insert_order(order)
    }
    fn get_order(&self, order_no: &str) -> xcredits_store::Result<Option<PaymentOrder>> {
        self.inner.get_order(order_no)
    }
    fn transition_order(
        &self,
        expected: OrderStatus,
        order: &PaymentOrder,
    ) -> xcredits_store::Result<()> {
        self.inner.transition_order(expected, order)
    }
    fn update_order_payload(
        &self,
        order_no: &str,
        expected: OrderStatus,
        now: DateTime<Utc>,
        edit: &dyn Fn(&mut serde_json::Value),
    ) -> xcredits_store::Result<PaymentOrder> {
        self.inner.update_order_payload(order_no, expected, now, edit)
    }
    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<PaymentOrder>> {
        self.inner.list_orders_by_user(user_id, limit, offset)
    }
    fn count_orders_by_user(&self, user_id: &UserId) -> xcredits_store::Result<u64> {
        self.inner.count_orders_by_user(user_id)
    }
    fn list_expired_pending_orders(
        &self,
        now: DateTime<Utc>,
    ) -> xcredits_store::Result<Vec<PaymentOrder>> {
        self.inner.list_expired_pending_orders(now)
    }
    fn insert_registration(&self, registration: &UserRegistration) -> xcredits_store::Result<()> {
        self.inner.insert_registration(registration)
    }
    fn get_registration(
        &self,
        id: &RegistrationId,
    ) -> xcredits_store::Result<Option<UserRegistration>> {
        self.inner.get_registration(id)
    }
    fn find_registration_by_email(
        &self,
        email: &str,
    ) -> xcredits_store::Result<Option<UserRegistration>> {
        self.inner.find_registration_by_email(email)
    }
    fn find_registration_by_username(
        &self,
        username: &str,
    ) -> xcredits_store::Result<Option<UserRegistration>> {
        self.inner.find_registration_by_username(username)
    }
    fn find_registration_by_token(
        &self,
        token: &str,
    ) -> xcredits_store::Result<Option<UserRegistration>> {
        self.inner.find_registration_by_token(token)
    }
    fn transition_registration(
        &self,
        expected: RegistrationStatus,
        registration: &UserRegistration,
    ) -> xcredits_store::Result<()> {
        self.inner.transition_registration(expected, registration)
    }
    fn delete_registration(&self, id: &RegistrationId) -> xcredits_store::Result<()> {
        self.inner.delete_registration(id)
    }
    fn list_registrations_by_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
        offset: usize,
    ) -> xcredits_store::Result<Vec<UserRegistration>> {
        self.inner
            .list_registrations_by_status(status, limit, offset)
    }
    fn count_registrations_by_status(
        &self,
        status: RegistrationStatus,
    ) -> xcredits_store::Result<u64> {
        self.inner.count_registrations_by_status(status)
    }
    fn delete_expired_registrations(&self, now: DateTime<Utc>) -> xcredits_store::Result<usize> {
        self.inner.delete_expired_registrations(now)
    }
    fn put_verification_code(&self, code: &VerificationCode) -> xcredits_store::Result<()> {
        self.inner.put_verification_code(code)
    }
    fn get_verification_code(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> xcredits_store::Result<Option<VerificationCode>> {
        self.inner.get_verification_code(email, purpose)
    }
    fn mark_verification_code_used(
        &self,
        email: &str,
        purpose: VerificationPurpose,
        code: &str,
    ) -> xcredits_store::Result<()> {
        self.inner.mark_verification_code_used(email, purpose, code)
    }
    fn delete_expired_verification_codes(
        &self,
        now: DateTime<Utc>,
    ) -> xcredits_store::Result<usize> {
        self.inner.delete_expired_verification_codes(now)
    }
}

/// Callback body understood by [`StubProvider`].
#[derive(Debug, Deserialize)]
struct StubCallback {
    order_no: String,
    transaction_id: String,
    amount_minor: i64,
    paid: bool,
    signature: String,
}

/// The signature [`StubProvider`] accepts for an order and amount.
pub fn stub_signature(order_no: &str, amount_minor: i64) -> String {
    format!("signed:{order_no}:{amount_minor}")
}

/// Build a callback body for [`StubProvider`].
pub fn stub_callback(order_no: &str, amount_minor: i64, paid: bool) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "order_no": order_no,
        "transaction_id": format!("tx-{order_no}"),
        "amount_minor": amount_minor,
        "paid": paid,
        "signature": stub_signature(order_no, amount_minor),
    }))
    .unwrap()
}

/// In-process provider with a trivially checkable signature.
#[derive(Default)]
pub struct StubProvider {
    pub fail_create: AtomicBool,
    pub created: AtomicUsize,
    pub refunds: AtomicUsize,
}

#[async_trait]
impl PaymentProvider for StubProvider {
    fn name(&self) -> &str {
        STUB_PROVIDER
    }

    async fn create_order(&self, order: &PaymentOrder) -> Result<CheckoutPayload, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::Request("stub is down".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(CheckoutPayload {
            payment_url: None,
            qr_code: Some(format!("stub://pay/{}", order.order_no)),
            data: serde_json::json!({ "provider": STUB_PROVIDER }),
        })
    }

    fn verify_callback(&self, raw: &[u8]) -> Result<VerifiedCallback, GatewayError> {
        let cb: StubCallback =
            serde_json::from_slice(raw).map_err(|e| GatewayError::Malformed(e.to_string()))?;
        if cb.signature != stub_signature(&cb.order_no, cb.amount_minor) {
            return Err(GatewayError::SignatureInvalid("bad stub signature".into()));
        }
        Ok(VerifiedCallback {
            order_no: cb.order_no,
            provider_transaction_id: cb.transaction_id,
            amount_minor: cb.amount_minor,
            paid_at: Utc::now(),
            valid: cb.paid,
        })
    }

    async fn refund(
        &self,
        order: &PaymentOrder,
        amount_minor: i64,
    ) -> Result<RefundOutcome, GatewayError> {
        self.refunds.fetch_add(1, Ordering::SeqCst);
        Ok(RefundOutcome {
            success: true,
            refund_id: Some(format!("{}_refund_{amount_minor}", order.order_no)),
            message: "ok".into(),
        })
    }

    fn acknowledgement(&self, success: bool) -> Acknowledgement {
        Acknowledgement {
            content_type: "text/plain",
            body: if success { "ok" } else { "fail" }.into(),
        }
    }
}

/// Engines over a [`FaultyStore`] with a manual clock and the stub provider.
pub struct Harness {
    pub store: Arc<FaultyStore>,
    pub clock: Arc<ManualClock>,
    pub provider: Arc<StubProvider>,
    pub engines: Engines,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(OrderConfig::default())
    }

    pub fn with_config(config: OrderConfig) -> Self {
        let store = Arc::new(FaultyStore::default());
        let clock = Arc::new(ManualClock::default());
        let provider = Arc::new(StubProvider::default());
        let mut gateways = PaymentGateways::new();
        gateways.register(provider.clone());
        let engines = Engines::new(store.clone(), gateways, clock.clone(), config);
        Self {
            store,
            clock,
            provider,
            engines,
        }
    }

    /// Sum of every recorded transaction amount for `user`.
    pub fn ledger_sum(&self, user: &UserId) -> i64 {
        self.store
            .list_transactions_by_user(user, usize::MAX, 0)
            .unwrap()
            .iter()
            .map(|tx| tx.amount)
            .sum()
    }
}
