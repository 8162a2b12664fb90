//! Payment order engine.
//!
//! Orders move from `pending` to exactly one terminal state, as allowed by
//! [`OrderStatus::can_transition_to`]. Every transition is a conditional
//! update on the stored status, so settlement, cancellation and the expiry
//! sweep can race without double effects: whichever commits first wins and
//! the others see `InvalidState`. Payload-only writes (checkout data, refund
//! records) never change the status.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use xcredits_core::{
    CreditsError, OrderStatus, PageRequest, Paged, PaymentOrder, Result, TransactionSource,
    UserId, DEFAULT_CURRENCY, DEFAULT_ORDER_TTL_MINUTES,
};
use xcredits_store::{Store, StoreError};

use crate::clock::Clock;
use crate::gateway::{CheckoutPayload, PaymentGateways, PaymentProvider, RefundOutcome};
use crate::ledger::Ledger;

/// Order pricing and lifetime settings.
#[derive(Debug, Clone)]
pub struct OrderConfig {
    /// How long an order stays payable.
    pub ttl: Duration,
    /// Price of one credit in minor currency units.
    pub credit_price_minor: i64,
    /// ISO currency code.
    pub currency: String,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::minutes(DEFAULT_ORDER_TTL_MINUTES),
            credit_price_minor: 1,
            currency: DEFAULT_CURRENCY.to_owned(),
        }
    }
}

/// What a processed callback did.
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackOutcome {
    /// The order was settled and credited by this callback.
    Settled(PaymentOrder),
    /// The provider reported a failed payment; the order is now failed.
    Failed(PaymentOrder),
    /// The order had already left `pending`; nothing changed.
    Unchanged(PaymentOrder),
}

/// Creates, settles and expires payment orders.
#[derive(Clone)]
pub struct OrderEngine {
    store: Arc<dyn Store>,
    ledger: Ledger,
    gateways: Arc<PaymentGateways>,
    clock: Arc<dyn Clock>,
    config: OrderConfig,
}

impl fmt::Debug for OrderEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderEngine")
            .field("gateways", &self.gateways)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OrderEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        ledger: Ledger,
        gateways: Arc<PaymentGateways>,
        clock: Arc<dyn Clock>,
        config: OrderConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            gateways,
            clock,
            config,
        }
    }

    /// The pricing and lifetime settings in use.
    #[must_use]
    pub fn config(&self) -> &OrderConfig {
        &self.config
    }

    /// The registered provider called `name`.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` for unknown providers.
    pub fn gateway(&self, name: &str) -> Result<Arc<dyn PaymentProvider>> {
        self.gateways.get(name)
    }

    /// Create a pending order for `credits` and open it with `provider`.
    ///
    /// The order is stored before the provider is called; if the provider
    /// fails the order is marked failed.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidInput` for non-positive credits,
    /// `CreditsError::NotFound` for an unknown provider and
    /// `CreditsError::Provider` if the provider call fails.
    pub async fn create_order(
        &self,
        user_id: &UserId,
        credits: i64,
        provider: &str,
    ) -> Result<(PaymentOrder, CheckoutPayload)> {
        if credits <= 0 {
            return Err(CreditsError::InvalidInput(
                "credits must be positive".into(),
            ));
        }
        let amount_minor = credits
            .checked_mul(self.config.credit_price_minor)
            .ok_or_else(|| CreditsError::InvalidInput("order amount overflows".into()))?;
        let provider = self.gateways.get(provider)?;
        self.ledger.get_or_create_account(user_id)?;

        let now = self.clock.now();
        let order = PaymentOrder::pending(
            *user_id,
            credits,
            amount_minor,
            self.config.currency.as_str(),
            provider.name(),
            now,
            self.config.ttl,
        );
        self.store.insert_order(&order)?;

        tracing::info!(
            user_id = %user_id,
            order_no = %order.order_no,
            credits,
            amount_minor,
            provider = provider.name(),
            "Payment order created"
        );

        match provider.create_order(&order).await {
            Ok(checkout) => {
                let recorded = json!(checkout);
                match self.store.update_order_payload(
                    &order.order_no,
                    OrderStatus::Pending,
                    now,
                    &|payload| merge_payload(payload, "checkout", recorded.clone()),
                ) {
                    Ok(opened) => Ok((opened, checkout)),
                    // Settled or cancelled while the provider call was in flight.
                    Err(StoreError::Conflict { .. }) => {
                        Ok((self.require(&order.order_no)?, checkout))
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => {
                tracing::warn!(
                    order_no = %order.order_no,
                    provider = provider.name(),
                    error = %e,
                    "Provider rejected payment order"
                );
                let mut failed = order.with_status(OrderStatus::Failed, now);
                merge_payload(&mut failed.provider_payload, "error", json!(e.to_string()));
                if let Err(mark_err) = self.transition(&order, &failed) {
                    tracing::warn!(
                        order_no = %order.order_no,
                        error = %mark_err,
                        "Could not mark order failed"
                    );
                }
                Err(e.into())
            }
        }
    }

    /// Settle a pending order and credit its owner.
    ///
    /// An order past its deadline is moved to `expired` and rejected, even if
    /// the sweep has not reached it yet.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound`, `CreditsError::InvalidState` if the
    /// order is not pending, `CreditsError::Expired` if it is past its
    /// deadline, and `CreditsError::PartialFailure` if the order was marked
    /// paid but the credit failed.
    pub fn complete(
        &self,
        order_no: &str,
        provider_transaction_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<PaymentOrder> {
        let order = self.require(order_no)?;
        ensure_transition(&order, OrderStatus::Paid)?;

        let now = self.clock.now();
        if order.is_expired_at(now) {
            let expired = order.with_status(OrderStatus::Expired, now);
            match self.transition(&order, &expired) {
                Ok(()) => {
                    tracing::info!(order_no, "Late settlement expired the order");
                }
                Err(CreditsError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            }
            return Err(CreditsError::expired("order", order_no));
        }

        let mut paid = order.with_status(OrderStatus::Paid, now);
        paid.paid_at = Some(paid_at);
        merge_payload(
            &mut paid.provider_payload,
            "transaction_id",
            json!(provider_transaction_id),
        );
        self.transition(&order, &paid)?;

        if let Err(e) = self.ledger.credit(
            &order.user_id,
            order.credits,
            TransactionSource::Purchase,
            order_no,
            &format!("Purchase {} credits ({order_no})", order.credits),
        ) {
            tracing::error!(
                order_no,
                user_id = %order.user_id,
                credits = order.credits,
                provider_transaction_id,
                error = %e,
                "Order marked paid but credit failed"
            );
            return Err(CreditsError::PartialFailure {
                operation: "complete_order",
                reference: order_no.to_owned(),
                message: e.to_string(),
            });
        }

        tracing::info!(
            order_no,
            user_id = %order.user_id,
            credits = order.credits,
            provider_transaction_id,
            "Payment order settled"
        );
        Ok(paid)
    }

    /// Cancel a pending order on behalf of its owner.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Forbidden` if `user_id` does not own the order
    /// and `CreditsError::InvalidState` if it is not pending.
    pub fn cancel(&self, order_no: &str, user_id: &UserId) -> Result<PaymentOrder> {
        let order = self.require(order_no)?;
        if order.user_id != *user_id {
            return Err(CreditsError::Forbidden);
        }

        let cancelled = order.with_status(OrderStatus::Cancelled, self.clock.now());
        self.transition(&order, &cancelled)?;
        tracing::info!(order_no, user_id = %user_id, "Payment order cancelled");
        Ok(cancelled)
    }

    /// Mark a pending order failed.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidState` if the order is not pending.
    pub fn fail(&self, order_no: &str, reason: &str) -> Result<PaymentOrder> {
        let order = self.require(order_no)?;

        let mut failed = order.with_status(OrderStatus::Failed, self.clock.now());
        merge_payload(&mut failed.provider_payload, "failure_reason", json!(reason));
        self.transition(&order, &failed)?;
        tracing::info!(order_no, reason, "Payment order failed");
        Ok(failed)
    }

    /// Expire every pending order past its deadline. Returns how many moved.
    ///
    /// Orders settled concurrently are skipped.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut expired = 0;
        for order in self.store.list_expired_pending_orders(now)? {
            let next = order.with_status(OrderStatus::Expired, now);
            match self.transition(&order, &next) {
                Ok(()) => expired += 1,
                Err(CreditsError::InvalidState { .. }) => {
                    tracing::debug!(order_no = %order.order_no, "Order left pending before sweep");
                }
                Err(e) => return Err(e),
            }
        }

        if expired > 0 {
            tracing::info!(count = expired, "Expired payment orders swept");
        }
        Ok(expired)
    }

    /// Authenticate a provider callback and settle the order it names.
    ///
    /// Nothing is mutated unless the provider verifies the payload. A repeated
    /// notification for an already-paid order is reported as unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::SignatureInvalid` for payloads that fail
    /// verification, `CreditsError::InvalidState` if the paid amount differs
    /// from the order, plus any error of [`OrderEngine::complete`].
    pub fn process_callback(&self, provider_name: &str, raw: &[u8]) -> Result<CallbackOutcome> {
        let provider = self.gateways.get(provider_name)?;
        let callback = provider.verify_callback(raw).map_err(|e| {
            tracing::warn!(provider = provider_name, error = %e, "Payment callback rejected");
            CreditsError::from(e)
        })?;

        let order = self.require(&callback.order_no)?;
        if order.provider != provider.name() {
            tracing::warn!(
                order_no = %order.order_no,
                provider = provider_name,
                expected = %order.provider,
                "Callback from a provider that does not own the order"
            );
            return Err(CreditsError::SignatureInvalid(
                "order belongs to another provider".into(),
            ));
        }

        if !order.status.can_transition_to(OrderStatus::Paid) {
            return Ok(CallbackOutcome::Unchanged(order));
        }
        if !callback.valid {
            let failed = self.fail(&order.order_no, "provider reported payment failure")?;
            return Ok(CallbackOutcome::Failed(failed));
        }
        if callback.amount_minor != order.amount_minor {
            tracing::warn!(
                order_no = %order.order_no,
                paid = callback.amount_minor,
                expected = order.amount_minor,
                "Callback amount does not match order"
            );
            return Err(CreditsError::invalid_state(
                "order",
                order.order_no,
                format!(
                    "amount mismatch: paid {}, expected {}",
                    callback.amount_minor, order.amount_minor
                ),
            ));
        }

        let paid = self.complete(
            &order.order_no,
            &callback.provider_transaction_id,
            callback.paid_at,
        )?;
        Ok(CallbackOutcome::Settled(paid))
    }

    /// Refund part or all of a paid order through its provider.
    ///
    /// The outcome is appended to the order payload. Credits are not clawed
    /// back.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::InvalidState` unless the order is paid,
    /// `CreditsError::InvalidInput` for an amount outside `1..=amount_minor`
    /// and `CreditsError::Provider` if the provider call fails.
    pub async fn refund(&self, order_no: &str, amount_minor: i64) -> Result<RefundOutcome> {
        let order = self.require(order_no)?;
        if !order.status.is_refundable() {
            return Err(CreditsError::invalid_state("order", order_no, order.status));
        }
        if amount_minor <= 0 || amount_minor > order.amount_minor {
            return Err(CreditsError::InvalidInput(format!(
                "refund amount must be between 1 and {}",
                order.amount_minor
            )));
        }

        let provider = self.gateways.get(&order.provider)?;
        let outcome = provider.refund(&order, amount_minor).await?;

        let now = self.clock.now();
        let record = json!({
            "amount_minor": amount_minor,
            "success": outcome.success,
            "refund_id": outcome.refund_id,
            "message": outcome.message,
            "at": now,
        });
        match self.store.update_order_payload(order_no, order.status, now, &|payload| {
            append_payload(payload, "refunds", record.clone());
        }) {
            Ok(_) => {}
            Err(StoreError::Conflict { .. }) => {
                let current = self.require(order_no)?;
                return Err(CreditsError::invalid_state("order", order_no, current.status));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            order_no,
            amount_minor,
            success = outcome.success,
            "Payment order refund requested"
        );
        Ok(outcome)
    }

    /// An order, visible only to its owner.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::NotFound` or `CreditsError::Forbidden`.
    pub fn get_order(&self, user_id: &UserId, order_no: &str) -> Result<PaymentOrder> {
        let order = self.require(order_no)?;
        if order.user_id != *user_id {
            return Err(CreditsError::Forbidden);
        }
        Ok(order)
    }

    /// The user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CreditsError::Storage` on persistence failure.
    pub fn list_orders(&self, user_id: &UserId, page: PageRequest) -> Result<Paged<PaymentOrder>> {
        Ok(Paged {
            items: self
                .store
                .list_orders_by_user(user_id, page.limit(), page.offset())?,
            total: self.store.count_orders_by_user(user_id)?,
            page: page.page(),
            page_size: page.page_size(),
        })
    }

    fn require(&self, order_no: &str) -> Result<PaymentOrder> {
        self.store
            .get_order(order_no)?
            .ok_or_else(|| CreditsError::not_found("order", order_no))
    }

    /// Commit `order` -> `next` if the transition table allows it, reporting
    /// the winner's state on conflict.
    fn transition(&self, order: &PaymentOrder, next: &PaymentOrder) -> Result<()> {
        ensure_transition(order, next.status)?;
        match self.store.transition_order(order.status, next) {
            Ok(()) => Ok(()),
            Err(StoreError::Conflict { .. }) => {
                let current = self.require(&next.order_no)?;
                Err(CreditsError::invalid_state(
                    "order",
                    next.order_no.as_str(),
                    current.status,
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn ensure_transition(order: &PaymentOrder, next: OrderStatus) -> Result<()> {
    if order.status.can_transition_to(next) {
        Ok(())
    } else {
        Err(CreditsError::invalid_state(
            "order",
            order.order_no.as_str(),
            order.status,
        ))
    }
}

/// Set `key` on an object payload, replacing a non-object payload.
fn merge_payload(payload: &mut Value, key: &str, value: Value) {
    if !payload.is_object() {
        *payload = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = payload {
        map.insert(key.to_owned(), value);
    }
}

/// Push `value` onto the array at `key` of an object payload.
fn append_payload(payload: &mut Value, key: &str, value: Value) {
    if !payload.is_object() {
        *payload = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = payload {
        match map.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            _ => {
                map.insert(key.to_owned(), Value::Array(vec![value]));
            }
        }
    }
}
