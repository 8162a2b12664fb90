//! In-memory storage implementation.
//!
//! All tables live behind one `RwLock`, so every conditional write is
//! trivially atomic with respect to every other.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use xcredits_core::{
    Account, CreditTransaction, OrderStatus, PaymentOrder, PricingRule, RedeemCode,
    RedeemCodeUsage, RegistrationId, RegistrationStatus, TransactionId, UserId, UserRegistration,
    VerificationCode, VerificationPurpose,
};

use crate::error::{Result, StoreError};
use crate::{count, paginate, Store};

#[derive(Default)]
struct Tables {
    accounts: HashMap<UserId, Account>,
    transactions: HashMap<TransactionId, CreditTransaction>,
    transactions_by_user: HashMap<UserId, Vec<TransactionId>>,
    pricing_rules: BTreeMap<String, PricingRule>,
    redeem_codes: HashMap<String, RedeemCode>,
    redeem_usages: HashMap<String, Vec<RedeemCodeUsage>>,
    orders: HashMap<String, PaymentOrder>,
    orders_by_user: HashMap<UserId, Vec<String>>,
    registrations: HashMap<RegistrationId, UserRegistration>,
    registrations_by_email: HashMap<String, RegistrationId>,
    registrations_by_username: HashMap<String, RegistrationId>,
    registrations_by_token: HashMap<String, RegistrationId>,
    verification_codes: HashMap<(String, VerificationPurpose), VerificationCode>,
}

impl Tables {
    fn registration_via(
        &self,
        index: &HashMap<String, RegistrationId>,
        key: &str,
    ) -> Option<UserRegistration> {
        index
            .get(key)
            .and_then(|id| self.registrations.get(id))
            .cloned()
    }

    fn unindex_registration(&mut self, registration: &UserRegistration) {
        self.registrations_by_email.remove(&registration.email);
        self.registrations_by_username.remove(&registration.username);
        if let Some(token) = &registration.token {
            self.registrations_by_token.remove(token);
        }
    }
}

/// In-memory storage implementation.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.tables.read().accounts.get(user_id).cloned())
    }

    fn create_account_if_absent(&self, account: &Account) -> Result<Account> {
        let mut tables = self.tables.write();
        Ok(tables
            .accounts
            .entry(account.user_id)
            .or_insert_with(|| account.clone())
            .clone())
    }

    fn commit_ledger_entry(
        &self,
        expected_version: u64,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let current = tables
            .accounts
            .get(&account.user_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account.user_id.to_string(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::conflict("account", account.user_id.to_string()));
        }

        tables.accounts.insert(account.user_id, account.clone());
        tables
            .transactions
            .insert(transaction.id, transaction.clone());
        tables
            .transactions_by_user
            .entry(transaction.user_id)
            .or_default()
            .push(transaction.id);
        Ok(())
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        Ok(self.tables.read().transactions.get(transaction_id).cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let tables = self.tables.read();
        let Some(ids) = tables.transactions_by_user.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(paginate(
            ids.iter()
                .rev()
                .filter_map(|id| tables.transactions.get(id).cloned()),
            limit,
            offset,
        ))
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        let tables = self.tables.read();
        Ok(count(tables.transactions_by_user.get(user_id).map_or(0, Vec::len)))
    }

    // =========================================================================
    // Pricing Rule Operations
    // =========================================================================

    fn put_pricing_rule(&self, rule: &PricingRule) -> Result<()> {
        self.tables
            .write()
            .pricing_rules
            .insert(rule.path.clone(), rule.clone());
        Ok(())
    }

    fn get_pricing_rule(&self, path: &str) -> Result<Option<PricingRule>> {
        Ok(self.tables.read().pricing_rules.get(path).cloned())
    }

    fn get_pricing_rules(&self, paths: &[&str]) -> Result<Vec<Option<PricingRule>>> {
        let tables = self.tables.read();
        Ok(paths
            .iter()
            .map(|path| tables.pricing_rules.get(*path).cloned())
            .collect())
    }

    fn list_pricing_rules(&self, limit: usize, offset: usize) -> Result<Vec<PricingRule>> {
        let tables = self.tables.read();
        Ok(paginate(
            tables
                .pricing_rules
                .values()
                .filter(|rule| rule.deleted_at.is_none())
                .cloned(),
            limit,
            offset,
        ))
    }

    fn count_pricing_rules(&self) -> Result<u64> {
        let tables = self.tables.read();
        Ok(count(
            tables
                .pricing_rules
                .values()
                .filter(|rule| rule.deleted_at.is_none())
                .count(),
        ))
    }

    // =========================================================================
    // Redeem Code Operations
    // =========================================================================

    fn insert_redeem_code(&self, code: &RedeemCode) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.redeem_codes.contains_key(&code.code) {
            return Err(StoreError::AlreadyExists {
                entity: "redeem code",
                id: code.code.clone(),
            });
        }
        tables.redeem_codes.insert(code.code.clone(), code.clone());
        Ok(())
    }

    fn get_redeem_code(&self, code: &str) -> Result<Option<RedeemCode>> {
        Ok(self.tables.read().redeem_codes.get(code).cloned())
    }

    fn update_redeem_code(
        &self,
        expected_version: u64,
        code: &RedeemCode,
        usage: Option<&RedeemCodeUsage>,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let current = tables
            .redeem_codes
            .get(&code.code)
            .ok_or_else(|| StoreError::NotFound {
                entity: "redeem code",
                id: code.code.clone(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::conflict("redeem code", code.code.clone()));
        }

        tables.redeem_codes.insert(code.code.clone(), code.clone());
        if let Some(usage) = usage {
            tables
                .redeem_usages
                .entry(code.code.clone())
                .or_default()
                .push(usage.clone());
        }
        Ok(())
    }

    fn list_redeem_codes(&self, limit: usize, offset: usize) -> Result<Vec<RedeemCode>> {
        let tables = self.tables.read();
        let mut codes: Vec<_> = tables.redeem_codes.values().cloned().collect();
        codes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(paginate(codes, limit, offset))
    }

    fn count_redeem_codes(&self) -> Result<u64> {
        Ok(count(self.tables.read().redeem_codes.len()))
    }

    fn list_redeem_code_usages(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RedeemCodeUsage>> {
        let tables = self.tables.read();
        let Some(usages) = tables.redeem_usages.get(code) else {
            return Ok(Vec::new());
        };
        Ok(paginate(usages.iter().rev().cloned(), limit, offset))
    }

    fn count_redeem_code_usages(&self, code: &str) -> Result<u64> {
        let tables = self.tables.read();
        Ok(count(tables.redeem_usages.get(code).map_or(0, Vec::len)))
    }

    // =========================================================================
    // Payment Order Operations
    // =========================================================================

    fn insert_order(&self, order: &PaymentOrder) -> Result<()> {
        let mut tables = self.tables.write();
        if tables.orders.contains_key(&order.order_no) {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.order_no.clone(),
            });
        }
        tables.orders.insert(order.order_no.clone(), order.clone());
        tables
            .orders_by_user
            .entry(order.user_id)
            .or_default()
            .push(order.order_no.clone());
        Ok(())
    }

    fn get_order(&self, order_no: &str) -> Result<Option<PaymentOrder>> {
        Ok(self.tables.read().orders.get(order_no).cloned())
    }

    fn transition_order(&self, expected: OrderStatus, order: &PaymentOrder) -> Result<()> {
        let mut tables = self.tables.write();
        let current = tables
            .orders
            .get(&order.order_no)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order.order_no.clone(),
            })?;
        if current.status != expected {
            return Err(StoreError::conflict("order", order.order_no.clone()));
        }
        tables.orders.insert(order.order_no.clone(), order.clone());
        Ok(())
    }

    fn update_order_payload(
        &self,
        order_no: &str,
        expected: OrderStatus,
        now: DateTime<Utc>,
        edit: &dyn Fn(&mut serde_json::Value),
    ) -> Result<PaymentOrder> {
        let mut tables = self.tables.write();
        let order = tables
            .orders
            .get_mut(order_no)
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order_no.to_owned(),
            })?;
        if order.status != expected {
            return Err(StoreError::conflict("order", order_no));
        }
        edit(&mut order.provider_payload);
        order.updated_at = now;
        Ok(order.clone())
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentOrder>> {
        let tables = self.tables.read();
        let Some(order_nos) = tables.orders_by_user.get(user_id) else {
            return Ok(Vec::new());
        };
        Ok(paginate(
            order_nos
                .iter()
                .rev()
                .filter_map(|no| tables.orders.get(no).cloned()),
            limit,
            offset,
        ))
    }

    fn count_orders_by_user(&self, user_id: &UserId) -> Result<u64> {
        let tables = self.tables.read();
        Ok(count(tables.orders_by_user.get(user_id).map_or(0, Vec::len)))
    }

    fn list_expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>> {
        let tables = self.tables.read();
        let mut orders: Vec<_> = tables
            .orders
            .values()
            .filter(|order| order.status == OrderStatus::Pending && order.expires_at < now)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.expires_at);
        Ok(orders)
    }

    // =========================================================================
    // Registration Operations
    // =========================================================================

    fn insert_registration(&self, registration: &UserRegistration) -> Result<()> {
        let mut tables = self.tables.write();
        let taken = if tables
            .registrations_by_email
            .contains_key(&registration.email)
        {
            Some(registration.email.clone())
        } else if tables
            .registrations_by_username
            .contains_key(&registration.username)
        {
            Some(registration.username.clone())
        } else {
            registration
                .token
                .as_ref()
                .filter(|token| tables.registrations_by_token.contains_key(*token))
                .cloned()
        };
        if let Some(id) = taken {
            return Err(StoreError::AlreadyExists {
                entity: "registration",
                id,
            });
        }

        tables
            .registrations_by_email
            .insert(registration.email.clone(), registration.id);
        tables
            .registrations_by_username
            .insert(registration.username.clone(), registration.id);
        if let Some(token) = &registration.token {
            tables
                .registrations_by_token
                .insert(token.clone(), registration.id);
        }
        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(())
    }

    fn get_registration(&self, id: &RegistrationId) -> Result<Option<UserRegistration>> {
        Ok(self.tables.read().registrations.get(id).cloned())
    }

    fn find_registration_by_email(&self, email: &str) -> Result<Option<UserRegistration>> {
        let tables = self.tables.read();
        Ok(tables.registration_via(&tables.registrations_by_email, email))
    }

    fn find_registration_by_username(&self, username: &str) -> Result<Option<UserRegistration>> {
        let tables = self.tables.read();
        Ok(tables.registration_via(&tables.registrations_by_username, username))
    }

    fn find_registration_by_token(&self, token: &str) -> Result<Option<UserRegistration>> {
        let tables = self.tables.read();
        Ok(tables.registration_via(&tables.registrations_by_token, token))
    }

    fn transition_registration(
        &self,
        expected: RegistrationStatus,
        registration: &UserRegistration,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let current = tables
            .registrations
            .get(&registration.id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "registration",
                id: registration.id.to_string(),
            })?;
        if current.status != expected {
            return Err(StoreError::conflict("registration", registration.id.to_string()));
        }
        let old_token = current.token.clone();

        if old_token != registration.token {
            if let Some(old) = old_token {
                tables.registrations_by_token.remove(&old);
            }
            if let Some(new) = &registration.token {
                tables
                    .registrations_by_token
                    .insert(new.clone(), registration.id);
            }
        }
        tables
            .registrations
            .insert(registration.id, registration.clone());
        Ok(())
    }

    fn delete_registration(&self, id: &RegistrationId) -> Result<()> {
        let mut tables = self.tables.write();
        let registration = tables
            .registrations
            .remove(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "registration",
                id: id.to_string(),
            })?;
        tables.unindex_registration(&registration);
        Ok(())
    }

    fn list_registrations_by_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserRegistration>> {
        let tables = self.tables.read();
        let mut registrations: Vec<_> = tables
            .registrations
            .values()
            .filter(|registration| registration.status == status)
            .cloned()
            .collect();
        registrations.sort_by_key(|registration| Reverse(registration.created_at));
        Ok(paginate(registrations, limit, offset))
    }

    fn count_registrations_by_status(&self, status: RegistrationStatus) -> Result<u64> {
        let tables = self.tables.read();
        Ok(count(
            tables
                .registrations
                .values()
                .filter(|registration| registration.status == status)
                .count(),
        ))
    }

    fn delete_expired_registrations(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.write();
        let expired: Vec<_> = tables
            .registrations
            .values()
            .filter(|r| r.status == RegistrationStatus::Pending && r.expires_at < now)
            .map(|r| r.id)
            .collect();
        for id in &expired {
            if let Some(registration) = tables.registrations.remove(id) {
                tables.unindex_registration(&registration);
            }
        }
        Ok(expired.len())
    }

    // =========================================================================
    // Verification Code Operations
    // =========================================================================

    fn put_verification_code(&self, code: &VerificationCode) -> Result<()> {
        self.tables
            .write()
            .verification_codes
            .insert((code.email.clone(), code.purpose), code.clone());
        Ok(())
    }

    fn get_verification_code(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>> {
        Ok(self
            .tables
            .read()
            .verification_codes
            .get(&(email.to_owned(), purpose))
            .cloned())
    }

    fn mark_verification_code_used(
        &self,
        email: &str,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<()> {
        let mut tables = self.tables.write();
        let stored = tables
            .verification_codes
            .get_mut(&(email.to_owned(), purpose))
            .ok_or_else(|| StoreError::NotFound {
                entity: "verification code",
                id: email.to_owned(),
            })?;
        if stored.used || stored.code != code {
            return Err(StoreError::conflict("verification code", email.to_owned()));
        }
        stored.used = true;
        Ok(())
    }

    fn delete_expired_verification_codes(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.verification_codes.len();
        tables
            .verification_codes
            .retain(|_, code| code.expires_at >= now);
        Ok(before - tables.verification_codes.len())
    }
}
