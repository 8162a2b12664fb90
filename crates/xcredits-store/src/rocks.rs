//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//!
//! Conditional writes read the current record, compare, and commit a
//! `WriteBatch` while holding `write_lock`, so no two of them interleave.
//! Plain reads never take the lock.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use xcredits_core::{
    Account, CreditTransaction, OrderStatus, PaymentOrder, PricingRule, RedeemCode,
    RedeemCodeUsage, RegistrationId, RegistrationStatus, TransactionId, UserId, UserRegistration,
    VerificationCode, VerificationPurpose,
};

use crate::error::{Result, StoreError};
use crate::keys::{self, RegistrationIndex};
use crate::schema::{all_column_families, cf};
use crate::{count, paginate, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

fn db_err(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db =
            DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors).map_err(db_err)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read and decode one record.
    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_err)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(cf_name)?;
        Ok(self.db.get_pinned_cf(&cf, key).map_err(db_err)?.is_some())
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db.write(batch).map_err(db_err)
    }

    /// Decode every value in a column family, in key order.
    fn scan<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let mut values = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item.map_err(db_err)?;
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    /// Collect all raw entries in a column family whose key starts with `prefix`.
    fn prefix_entries(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    /// Collect all values in a column family whose key starts with `prefix`.
    fn prefix_values<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut values = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(db_err)?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(Self::deserialize(&value)?);
        }
        Ok(values)
    }

    fn registration_via(&self, index: RegistrationIndex<'_>) -> Result<Option<UserRegistration>> {
        let cf = self.cf(cf::REGISTRATION_INDEX)?;
        let Some(raw) = self
            .db
            .get_cf(&cf, keys::registration_index_key(index))
            .map_err(db_err)?
        else {
            return Ok(None);
        };
        let bytes: [u8; 16] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed registration index".into()))?;
        self.get_registration(&RegistrationId::from_bytes(bytes))
    }

    fn unindex_registration(
        &self,
        batch: &mut WriteBatch,
        registration: &UserRegistration,
    ) -> Result<()> {
        let cf_regs = self.cf(cf::REGISTRATIONS)?;
        let cf_index = self.cf(cf::REGISTRATION_INDEX)?;
        batch.delete_cf(&cf_regs, keys::registration_key(&registration.id));
        batch.delete_cf(
            &cf_index,
            keys::registration_index_key(RegistrationIndex::Email(&registration.email)),
        );
        batch.delete_cf(
            &cf_index,
            keys::registration_index_key(RegistrationIndex::Username(&registration.username)),
        );
        if let Some(token) = &registration.token {
            batch.delete_cf(
                &cf_index,
                keys::registration_index_key(RegistrationIndex::Token(token)),
            );
        }
        Ok(())
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Account Operations
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn create_account_if_absent(&self, account: &Account) -> Result<Account> {
        let _guard = self.write_lock.lock();
        if let Some(existing) = self.get_account(&account.user_id)? {
            return Ok(existing);
        }

        let cf = self.cf(cf::ACCOUNTS)?;
        self.db
            .put_cf(&cf, keys::account_key(&account.user_id), Self::serialize(account)?)
            .map_err(db_err)?;
        Ok(account.clone())
    }

    fn commit_ledger_entry(
        &self,
        expected_version: u64,
        account: &Account,
        transaction: &CreditTransaction,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_account(&account.user_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "account",
                id: account.user_id.to_string(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::conflict("account", account.user_id.to_string()));
        }

        let cf_accounts = self.cf(cf::ACCOUNTS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        // Write atomically
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_accounts,
            keys::account_key(&account.user_id),
            Self::serialize(account)?,
        );
        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_tx_by_user,
            keys::user_transaction_key(&transaction.user_id, account.version),
            transaction.id.to_bytes(),
        );
        self.write(batch)
    }

    // =========================================================================
    // Transaction Operations
    // =========================================================================

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<CreditTransaction>> {
        self.get(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let mut entries =
            self.prefix_entries(cf::TRANSACTIONS_BY_USER, &keys::user_prefix(user_id))?;

        // Reverse to get newest first
        entries.reverse();

        let mut transactions = Vec::new();
        for (_, value) in paginate(entries, limit, offset) {
            let Some(tx_id) = keys::transaction_id_from_index_value(&value) else {
                continue;
            };
            if let Some(tx) = self.get_transaction(&tx_id)? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }

    fn count_transactions_by_user(&self, user_id: &UserId) -> Result<u64> {
        let entries = self.prefix_entries(cf::TRANSACTIONS_BY_USER, &keys::user_prefix(user_id))?;
        Ok(count(entries.len()))
    }

    // =========================================================================
    // Pricing Rule Operations
    // =========================================================================

    fn put_pricing_rule(&self, rule: &PricingRule) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(cf::PRICING_RULES)?;
        self.db
            .put_cf(&cf, keys::pricing_rule_key(&rule.path), Self::serialize(rule)?)
            .map_err(db_err)
    }

    fn get_pricing_rule(&self, path: &str) -> Result<Option<PricingRule>> {
        self.get(cf::PRICING_RULES, &keys::pricing_rule_key(path))
    }

    fn get_pricing_rules(&self, paths: &[&str]) -> Result<Vec<Option<PricingRule>>> {
        let cf = self.cf(cf::PRICING_RULES)?;
        self.db
            .multi_get_cf(paths.iter().map(|path| (&cf, keys::pricing_rule_key(path))))
            .into_iter()
            .map(|raw| {
                raw.map_err(db_err)?
                    .map(|data| Self::deserialize(&data))
                    .transpose()
            })
            .collect()
    }

    fn list_pricing_rules(&self, limit: usize, offset: usize) -> Result<Vec<PricingRule>> {
        let rules: Vec<PricingRule> = self.scan(cf::PRICING_RULES)?;
        Ok(paginate(
            rules.into_iter().filter(|rule| rule.deleted_at.is_none()),
            limit,
            offset,
        ))
    }

    fn count_pricing_rules(&self) -> Result<u64> {
        let rules: Vec<PricingRule> = self.scan(cf::PRICING_RULES)?;
        Ok(count(
            rules.iter().filter(|rule| rule.deleted_at.is_none()).count(),
        ))
    }

    // =========================================================================
    // Redeem Code Operations
    // =========================================================================

    fn insert_redeem_code(&self, code: &RedeemCode) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::redeem_code_key(&code.code);
        if self.exists(cf::REDEEM_CODES, &key)? {
            return Err(StoreError::AlreadyExists {
                entity: "redeem code",
                id: code.code.clone(),
            });
        }
        let cf = self.cf(cf::REDEEM_CODES)?;
        self.db
            .put_cf(&cf, key, Self::serialize(code)?)
            .map_err(db_err)
    }

    fn get_redeem_code(&self, code: &str) -> Result<Option<RedeemCode>> {
        self.get(cf::REDEEM_CODES, &keys::redeem_code_key(code))
    }

    fn update_redeem_code(
        &self,
        expected_version: u64,
        code: &RedeemCode,
        usage: Option<&RedeemCodeUsage>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_redeem_code(&code.code)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "redeem code",
                id: code.code.clone(),
            })?;
        if current.version != expected_version {
            return Err(StoreError::conflict("redeem code", code.code.clone()));
        }

        let cf_codes = self.cf(cf::REDEEM_CODES)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_codes,
            keys::redeem_code_key(&code.code),
            Self::serialize(code)?,
        );
        if let Some(usage) = usage {
            let cf_usages = self.cf(cf::REDEEM_CODE_USAGES)?;
            batch.put_cf(
                &cf_usages,
                keys::redeem_usage_key(&usage.code, code.version),
                Self::serialize(usage)?,
            );
        }
        self.write(batch)
    }

    fn list_redeem_codes(&self, limit: usize, offset: usize) -> Result<Vec<RedeemCode>> {
        let mut codes: Vec<RedeemCode> = self.scan(cf::REDEEM_CODES)?;
        codes.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.code.cmp(&b.code))
        });
        Ok(paginate(codes, limit, offset))
    }

    fn count_redeem_codes(&self) -> Result<u64> {
        let cf = self.cf(cf::REDEEM_CODES)?;
        let mut n = 0;
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            item.map_err(db_err)?;
            n += 1;
        }
        Ok(n)
    }

    fn list_redeem_code_usages(
        &self,
        code: &str,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<RedeemCodeUsage>> {
        let mut usages: Vec<RedeemCodeUsage> =
            self.prefix_values(cf::REDEEM_CODE_USAGES, &keys::redeem_usage_prefix(code))?;
        usages.reverse();
        Ok(paginate(usages, limit, offset))
    }

    fn count_redeem_code_usages(&self, code: &str) -> Result<u64> {
        let entries =
            self.prefix_entries(cf::REDEEM_CODE_USAGES, &keys::redeem_usage_prefix(code))?;
        Ok(count(entries.len()))
    }

    // =========================================================================
    // Payment Order Operations
    // =========================================================================

    fn insert_order(&self, order: &PaymentOrder) -> Result<()> {
        let _guard = self.write_lock.lock();
        let key = keys::order_key(&order.order_no);
        if self.exists(cf::ORDERS, &key)? {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.order_no.clone(),
            });
        }

        let cf_orders = self.cf(cf::ORDERS)?;
        let cf_by_user = self.cf(cf::ORDERS_BY_USER)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_orders, key, Self::serialize(order)?);
        batch.put_cf(
            &cf_by_user,
            keys::user_order_key(
                &order.user_id,
                order.created_at.timestamp_millis(),
                &order.order_no,
            ),
            [],
        );
        self.write(batch)
    }

    fn get_order(&self, order_no: &str) -> Result<Option<PaymentOrder>> {
        self.get(cf::ORDERS, &keys::order_key(order_no))
    }

    fn transition_order(&self, expected: OrderStatus, order: &PaymentOrder) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_order(&order.order_no)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order.order_no.clone(),
            })?;
        if current.status != expected {
            return Err(StoreError::conflict("order", order.order_no.clone()));
        }

        let cf = self.cf(cf::ORDERS)?;
        self.db
            .put_cf(&cf, keys::order_key(&order.order_no), Self::serialize(order)?)
            .map_err(db_err)
    }

    fn update_order_payload(
        &self,
        order_no: &str,
        expected: OrderStatus,
        now: DateTime<Utc>,
        edit: &dyn Fn(&mut serde_json::Value),
    ) -> Result<PaymentOrder> {
        let _guard = self.write_lock.lock();
        let mut order = self
            .get_order(order_no)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "order",
                id: order_no.to_owned(),
            })?;
        if order.status != expected {
            return Err(StoreError::conflict("order", order_no));
        }
        edit(&mut order.provider_payload);
        order.updated_at = now;

        let cf = self.cf(cf::ORDERS)?;
        self.db
            .put_cf(&cf, keys::order_key(order_no), Self::serialize(&order)?)
            .map_err(db_err)?;
        Ok(order)
    }

    fn list_orders_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<PaymentOrder>> {
        let mut entries = self.prefix_entries(cf::ORDERS_BY_USER, &keys::user_prefix(user_id))?;
        entries.reverse();

        let mut orders = Vec::new();
        for (key, _) in paginate(entries, limit, offset) {
            let Some(order_no) = keys::extract_order_no_from_user_key(&key) else {
                continue;
            };
            if let Some(order) = self.get_order(order_no)? {
                orders.push(order);
            }
        }
        Ok(orders)
    }

    fn count_orders_by_user(&self, user_id: &UserId) -> Result<u64> {
        let entries = self.prefix_entries(cf::ORDERS_BY_USER, &keys::user_prefix(user_id))?;
        Ok(count(entries.len()))
    }

    fn list_expired_pending_orders(&self, now: DateTime<Utc>) -> Result<Vec<PaymentOrder>> {
        let orders: Vec<PaymentOrder> = self.scan(cf::ORDERS)?;
        let mut expired: Vec<_> = orders
            .into_iter()
            .filter(|order| order.status == OrderStatus::Pending && order.expires_at < now)
            .collect();
        expired.sort_by_key(|order| order.expires_at);
        Ok(expired)
    }

    // =========================================================================
    // Registration Operations
    // =========================================================================

    fn insert_registration(&self, registration: &UserRegistration) -> Result<()> {
        let _guard = self.write_lock.lock();

        let mut indices = vec![
            (
                RegistrationIndex::Email(&registration.email),
                registration.email.as_str(),
            ),
            (
                RegistrationIndex::Username(&registration.username),
                registration.username.as_str(),
            ),
        ];
        if let Some(token) = &registration.token {
            indices.push((RegistrationIndex::Token(token), token.as_str()));
        }
        for (index, value) in &indices {
            if self.exists(cf::REGISTRATION_INDEX, &keys::registration_index_key(*index))? {
                return Err(StoreError::AlreadyExists {
                    entity: "registration",
                    id: (*value).to_owned(),
                });
            }
        }

        let cf_regs = self.cf(cf::REGISTRATIONS)?;
        let cf_index = self.cf(cf::REGISTRATION_INDEX)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_regs,
            keys::registration_key(&registration.id),
            Self::serialize(registration)?,
        );
        for (index, _) in indices {
            batch.put_cf(
                &cf_index,
                keys::registration_index_key(index),
                registration.id.as_bytes(),
            );
        }
        self.write(batch)
    }

    fn get_registration(&self, id: &RegistrationId) -> Result<Option<UserRegistration>> {
        self.get(cf::REGISTRATIONS, &keys::registration_key(id))
    }

    fn find_registration_by_email(&self, email: &str) -> Result<Option<UserRegistration>> {
        self.registration_via(RegistrationIndex::Email(email))
    }

    fn find_registration_by_username(&self, username: &str) -> Result<Option<UserRegistration>> {
        self.registration_via(RegistrationIndex::Username(username))
    }

    fn find_registration_by_token(&self, token: &str) -> Result<Option<UserRegistration>> {
        self.registration_via(RegistrationIndex::Token(token))
    }

    fn transition_registration(
        &self,
        expected: RegistrationStatus,
        registration: &UserRegistration,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let current = self
            .get_registration(&registration.id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "registration",
                id: registration.id.to_string(),
            })?;
        if current.status != expected {
            return Err(StoreError::conflict("registration", registration.id.to_string()));
        }

        let cf_regs = self.cf(cf::REGISTRATIONS)?;
        let cf_index = self.cf(cf::REGISTRATION_INDEX)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_regs,
            keys::registration_key(&registration.id),
            Self::serialize(registration)?,
        );
        if current.token != registration.token {
            if let Some(old) = &current.token {
                batch.delete_cf(
                    &cf_index,
                    keys::registration_index_key(RegistrationIndex::Token(old)),
                );
            }
            if let Some(new) = &registration.token {
                batch.put_cf(
                    &cf_index,
                    keys::registration_index_key(RegistrationIndex::Token(new)),
                    registration.id.as_bytes(),
                );
            }
        }
        self.write(batch)
    }

    fn delete_registration(&self, id: &RegistrationId) -> Result<()> {
        let _guard = self.write_lock.lock();
        let registration = self
            .get_registration(id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "registration",
                id: id.to_string(),
            })?;
        let mut batch = WriteBatch::default();
        self.unindex_registration(&mut batch, &registration)?;
        self.write(batch)
    }

    fn list_registrations_by_status(
        &self,
        status: RegistrationStatus,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UserRegistration>> {
        let registrations: Vec<UserRegistration> = self.scan(cf::REGISTRATIONS)?;
        let mut matching: Vec<_> = registrations
            .into_iter()
            .filter(|registration| registration.status == status)
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(matching, limit, offset))
    }

    fn count_registrations_by_status(&self, status: RegistrationStatus) -> Result<u64> {
        let registrations: Vec<UserRegistration> = self.scan(cf::REGISTRATIONS)?;
        Ok(count(
            registrations
                .iter()
                .filter(|registration| registration.status == status)
                .count(),
        ))
    }

    fn delete_expired_registrations(&self, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let registrations: Vec<UserRegistration> = self.scan(cf::REGISTRATIONS)?;
        let mut batch = WriteBatch::default();
        let mut deleted = 0;
        for registration in registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Pending && r.expires_at < now)
        {
            self.unindex_registration(&mut batch, registration)?;
            deleted += 1;
        }
        self.write(batch)?;
        Ok(deleted)
    }

    // =========================================================================
    // Verification Code Operations
    // =========================================================================

    fn put_verification_code(&self, code: &VerificationCode) -> Result<()> {
        let _guard = self.write_lock.lock();
        let cf = self.cf(cf::VERIFICATION_CODES)?;
        self.db
            .put_cf(
                &cf,
                keys::verification_code_key(&code.email, code.purpose),
                Self::serialize(code)?,
            )
            .map_err(db_err)
    }

    fn get_verification_code(
        &self,
        email: &str,
        purpose: VerificationPurpose,
    ) -> Result<Option<VerificationCode>> {
        self.get(
            cf::VERIFICATION_CODES,
            &keys::verification_code_key(email, purpose),
        )
    }

    fn mark_verification_code_used(
        &self,
        email: &str,
        purpose: VerificationPurpose,
        code: &str,
    ) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut stored =
            self.get_verification_code(email, purpose)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "verification code",
                    id: email.to_owned(),
                })?;
        if stored.used || stored.code != code {
            return Err(StoreError::conflict("verification code", email.to_owned()));
        }
        stored.used = true;

        let cf = self.cf(cf::VERIFICATION_CODES)?;
        self.db
            .put_cf(
                &cf,
                keys::verification_code_key(email, purpose),
                Self::serialize(&stored)?,
            )
            .map_err(db_err)
    }

    fn delete_expired_verification_codes(&self, now: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock();
        let codes: Vec<VerificationCode> = self.scan(cf::VERIFICATION_CODES)?;
        let cf = self.cf(cf::VERIFICATION_CODES)?;
        let mut batch = WriteBatch::default();
        let mut deleted = 0;
        for code in codes.iter().filter(|code| code.expires_at < now) {
            batch.delete_cf(&cf, keys::verification_code_key(&code.email, code.purpose));
            deleted += 1;
        }
        self.write(batch)?;
        Ok(deleted)
    }
}
