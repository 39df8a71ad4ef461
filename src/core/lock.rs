//! Per-aggregate mutual exclusion
//!
//! Every balance-mutating operation runs inside a lock on the aggregate it
//! mutates. A lock is a lease in a [`LockBackend`], keyed by [`LockKey`] and
//! owned by a random token, so a holder can only release its own lease and a
//! crashed holder's lease expires after the configured TTL.
//!
//! # Fresh snapshots
//!
//! [`LockManager::acquire_lock`] and [`LockManager::acquire_lock_or_throw`]
//! reload the aggregate from the store after the lease is granted and hand
//! that copy to the callback. Whatever instance the caller held before is
//! only used to derive the key.
//!
//! # Ordering
//!
//! Keys have a canonical order: aggregate kind first (trades, commerce
//! transactions and stakes before accounts), then id. A thread may only
//! acquire a key strictly greater than every key it already holds; anything
//! else fails with [`LedgerError::LockOrderViolation`] before touching the
//! backend. Nested acquisition in canonical order never deadlocks.

use crate::config::LockSettings;
use crate::core::traits::LedgerStore;
use crate::types::{LedgerError, PaymentAccount, TradeReservation, WalletAccount};
use dashmap::DashMap;
use std::cell::RefCell;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Aggregate families, in canonical lock order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateKind {
    Trade,
    CommerceTransaction,
    Stake,
    WalletAccount,
    PaymentAccount,
}

impl AggregateKind {
    pub fn table(&self) -> &'static str {
        match self {
            AggregateKind::Trade => "trades",
            AggregateKind::CommerceTransaction => "commerce_transactions",
            AggregateKind::Stake => "stakes",
            AggregateKind::WalletAccount => "wallet_accounts",
            AggregateKind::PaymentAccount => "payment_accounts",
        }
    }
}

/// Lock name of one aggregate row
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockKey {
    pub kind: AggregateKind,
    pub id: u64,
}

impl LockKey {
    pub fn new(kind: AggregateKind, id: u64) -> Self {
        LockKey { kind, id }
    }

    pub fn trade(id: u64) -> Self {
        Self::new(AggregateKind::Trade, id)
    }

    pub fn commerce(id: u64) -> Self {
        Self::new(AggregateKind::CommerceTransaction, id)
    }

    pub fn stake(id: u64) -> Self {
        Self::new(AggregateKind::Stake, id)
    }

    pub fn wallet_account(id: u64) -> Self {
        Self::new(AggregateKind::WalletAccount, id)
    }

    pub fn payment_account(id: u64) -> Self {
        Self::new(AggregateKind::PaymentAccount, id)
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.table(), self.id)
    }
}

/// Aggregate that can be locked and reloaded
pub trait Lockable: Sized {
    fn lock_key(&self) -> LockKey;

    /// Reload the aggregate from the store
    fn fresh(&self, store: &dyn LedgerStore) -> Result<Self, LedgerError>;
}

impl Lockable for WalletAccount {
    fn lock_key(&self) -> LockKey {
        LockKey::wallet_account(self.id)
    }

    fn fresh(&self, store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        store.wallet_account(self.id)
    }
}

impl Lockable for PaymentAccount {
    fn lock_key(&self) -> LockKey {
        LockKey::payment_account(self.id)
    }

    fn fresh(&self, store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        store.payment_account(self.id)
    }
}

impl Lockable for TradeReservation {
    fn lock_key(&self) -> LockKey {
        LockKey::trade(self.trade_id)
    }

    fn fresh(&self, store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        store
            .trade_reservation(self.trade_id)
            .ok_or_else(|| LedgerError::not_found("trade_reservation", self.trade_id))
    }
}

/// Aggregates owned by other subsystems (trades, commerce transactions,
/// stakes) are locked by key alone; their state is not in the ledger store.
impl Lockable for LockKey {
    fn lock_key(&self) -> LockKey {
        *self
    }

    fn fresh(&self, _store: &dyn LedgerStore) -> Result<Self, LedgerError> {
        Ok(*self)
    }
}

/// Shared lease store
///
/// Implementations must make `try_acquire` atomic with respect to other
/// callers of the same key.
pub trait LockBackend: Send + Sync {
    /// Take the lease if it is free or expired
    fn try_acquire(&self, key: &LockKey, owner: Uuid, ttl: Duration) -> bool;

    /// Drop the lease if `owner` still holds it
    fn release(&self, key: &LockKey, owner: Uuid) -> bool;
}

#[derive(Debug, Clone, Copy)]
struct Lease {
    owner: Uuid,
    expires_at: Instant,
}

/// In-process lease table
#[derive(Debug, Default)]
pub struct InMemoryLockBackend {
    leases: DashMap<LockKey, Lease>,
}

impl InMemoryLockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a live lease exists for `key`
    pub fn is_held(&self, key: &LockKey) -> bool {
        self.leases
            .get(key)
            .is_some_and(|lease| lease.expires_at > Instant::now())
    }
}

impl LockBackend for InMemoryLockBackend {
    fn try_acquire(&self, key: &LockKey, owner: Uuid, ttl: Duration) -> bool {
        let now = Instant::now();
        let fresh = Lease {
            owner,
            expires_at: now + ttl,
        };

        // The entry guard keeps the shard locked for the check-and-set
        let mut lease = self.leases.entry(*key).or_insert(fresh);
        if lease.owner == owner {
            return true;
        }
        if lease.expires_at <= now {
            warn!(key = %key, previous_owner = %lease.owner, "Taking over expired lock lease");
            *lease = fresh;
            return true;
        }

        false
    }

    fn release(&self, key: &LockKey, owner: Uuid) -> bool {
        self.leases
            .remove_if(key, |_, lease| lease.owner == owner)
            .is_some()
    }
}

thread_local! {
    static HELD_LOCKS: RefCell<Vec<LockKey>> = const { RefCell::new(Vec::new()) };
}

fn check_order(requested: &LockKey) -> Result<(), LedgerError> {
    HELD_LOCKS.with(|held| match held.borrow().iter().max() {
        Some(top) if requested <= top => Err(LedgerError::LockOrderViolation {
            held: top.to_string(),
            requested: requested.to_string(),
        }),
        _ => Ok(()),
    })
}

/// Held lease; released on drop
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard {
    backend: Arc<dyn LockBackend>,
    key: LockKey,
    owner: Uuid,
}

impl LockGuard {
    pub fn key(&self) -> LockKey {
        self.key
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("owner", &self.owner)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.backend.release(&self.key, self.owner) {
            warn!(key = %self.key, "Lock lease expired before release");
        }
        HELD_LOCKS.with(|held| held.borrow_mut().retain(|key| *key != self.key));
        debug!(key = %self.key, "Released lock");
    }
}

/// Entry point for acquiring aggregate locks
#[derive(Clone)]
pub struct LockManager {
    backend: Arc<dyn LockBackend>,
    settings: LockSettings,
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl LockManager {
    pub fn new(backend: Arc<dyn LockBackend>, settings: LockSettings) -> Self {
        LockManager { backend, settings }
    }

    /// Manager over a private [`InMemoryLockBackend`]
    pub fn in_memory(settings: LockSettings) -> Self {
        Self::new(Arc::new(InMemoryLockBackend::new()), settings)
    }

    pub fn settings(&self) -> &LockSettings {
        &self.settings
    }

    /// Run `f` on a fresh copy of `aggregate` while holding its lock
    ///
    /// Waits with exponential backoff up to the configured wait timeout and
    /// fails with [`LedgerError::LockTimeout`] after that. The lock is
    /// released when `f` returns, fails or panics.
    pub fn acquire_lock<A, T, F>(
        &self,
        store: &dyn LedgerStore,
        aggregate: &A,
        f: F,
    ) -> Result<T, LedgerError>
    where
        A: Lockable,
        F: FnOnce(A) -> Result<T, LedgerError>,
    {
        let _guard = self.lock(aggregate.lock_key())?;
        let fresh = aggregate.fresh(store)?;
        f(fresh)
    }

    /// Like [`acquire_lock`](Self::acquire_lock) but fails with
    /// [`LedgerError::ResourceBusy`] instead of waiting
    pub fn acquire_lock_or_throw<A, T, F>(
        &self,
        store: &dyn LedgerStore,
        aggregate: &A,
        f: F,
    ) -> Result<T, LedgerError>
    where
        A: Lockable,
        F: FnOnce(A) -> Result<T, LedgerError>,
    {
        let _guard = self.try_lock(aggregate.lock_key())?;
        let fresh = aggregate.fresh(store)?;
        f(fresh)
    }

    /// Run `f` while holding every key, acquired in canonical order
    pub fn acquire_all<T, F>(&self, keys: &[LockKey], f: F) -> Result<T, LedgerError>
    where
        F: FnOnce() -> Result<T, LedgerError>,
    {
        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key)?);
        }

        let result = f();
        // Release in reverse acquisition order
        while let Some(guard) = guards.pop() {
            drop(guard);
        }
        result
    }

    /// Blocking acquisition of a bare key
    pub fn lock(&self, key: LockKey) -> Result<LockGuard, LedgerError> {
        check_order(&key)?;

        let owner = Uuid::new_v4();
        let started = Instant::now();
        let timeout = self.settings.wait_timeout();
        let mut backoff = self.settings.initial_backoff();

        while !self.backend.try_acquire(&key, owner, self.settings.ttl()) {
            let waited = started.elapsed();
            if waited >= timeout {
                warn!(key = %key, waited_ms = waited.as_millis() as u64, "Timed out waiting for lock");
                return Err(LedgerError::LockTimeout {
                    key: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }

            debug!(key = %key, backoff_ms = backoff.as_millis() as u64, "Lock busy, waiting");
            thread::sleep(backoff.min(timeout - waited));
            backoff = (backoff * 2).min(self.settings.max_backoff());
        }

        Ok(self.granted(key, owner))
    }

    /// Non-blocking acquisition of a bare key
    pub fn try_lock(&self, key: LockKey) -> Result<LockGuard, LedgerError> {
        check_order(&key)?;

        let owner = Uuid::new_v4();
        if !self.backend.try_acquire(&key, owner, self.settings.ttl()) {
            debug!(key = %key, "Lock busy");
            return Err(LedgerError::resource_busy(key));
        }

        Ok(self.granted(key, owner))
    }

    fn granted(&self, key: LockKey, owner: Uuid) -> LockGuard {
        HELD_LOCKS.with(|held| held.borrow_mut().push(key));
        debug!(key = %key, "Acquired lock");
        LockGuard {
            backend: Arc::clone(&self.backend),
            key,
            owner,
        }
    }
}
