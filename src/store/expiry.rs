//! Per-entry expiry for keys written with a TTL.
//!
//! # Design
//!
//! - Two-way index: deadline→keys and key→deadline, so re-arming or disarming
//!   a key on update/delete is cheap
//! - Each entry has at most one pending deadline; the latest write wins
//! - One background reaper per store wakes at the earliest deadline and
//!   deletes due keys through the store's regular delete path
//! - The reaper holds only a weak reference to its own store, so an expiry
//!   can never land on another store instance and never keeps a store alive
//!
//! Expiry is fire-and-forget: if the delete of a due key fails (the key was
//! already gone) the failure is logged and otherwise ignored.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use super::MemStore;
use crate::utils::async_task::spawn_task;
use crate::Result;

/// Deadline index for keys with a TTL
///
/// Keys are stored namespaced. Not synchronized on its own; it lives inside
/// the store's locked state so arming a deadline is atomic with the write.
#[derive(Debug, Default)]
pub(crate) struct ExpiryIndex {
    /// deadline -> keys expiring at that instant
    expirations: BTreeMap<Instant, Vec<String>>,

    /// key -> deadline
    key_to_expiry: HashMap<String, Instant>,
}

impl ExpiryIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Arms (or re-arms) the deadline of `key` to `ttl_secs` from now.
    ///
    /// A TTL too large to be represented as a deadline leaves the key
    /// without one: it never expires.
    pub(crate) fn register(
        &mut self,
        key: &str,
        ttl_secs: u64,
    ) -> Option<Instant> {
        self.unregister(key);

        let expire_at = Instant::now().checked_add(Duration::from_secs(ttl_secs))?;
        self.expirations.entry(expire_at).or_default().push(key.to_string());
        self.key_to_expiry.insert(key.to_string(), expire_at);
        Some(expire_at)
    }

    /// Disarms the deadline of `key`, if any
    pub(crate) fn unregister(
        &mut self,
        key: &str,
    ) {
        if let Some(expire_at) = self.key_to_expiry.remove(key) {
            if let Some(keys) = self.expirations.get_mut(&expire_at) {
                keys.retain(|k| k != key);
                if keys.is_empty() {
                    self.expirations.remove(&expire_at);
                }
            }
        }
    }

    /// Removes and returns every key due at or before `now`
    pub(crate) fn take_expired(
        &mut self,
        now: Instant,
    ) -> Vec<String> {
        let due: Vec<Instant> = self.expirations.range(..=now).map(|(at, _)| *at).collect();

        let mut expired = Vec::new();
        for at in due {
            if let Some(keys) = self.expirations.remove(&at) {
                for key in &keys {
                    self.key_to_expiry.remove(key);
                }
                expired.extend(keys);
            }
        }
        expired
    }

    /// Earliest pending deadline
    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.expirations.keys().next().copied()
    }

    pub(crate) fn get_expiration(
        &self,
        key: &str,
    ) -> Option<Instant> {
        self.key_to_expiry.get(key).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.key_to_expiry.len()
    }
}

/// Background worker deleting keys whose deadline has passed
#[derive(Debug, Default)]
pub(crate) struct TtlReaper {
    wake: Arc<Notify>,
}

impl TtlReaper {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Spawns the reaper loop for `store` on `runtime`.
    pub(crate) fn start(
        &self,
        store: Weak<MemStore>,
        runtime: &Handle,
        shutdown: CancellationToken,
    ) {
        let wake = self.wake.clone();
        spawn_task(runtime, "ttl_reaper", run(store, wake, shutdown));
    }

    /// Re-evaluate the earliest deadline (a new one may be sooner)
    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }
}

async fn run(
    store: Weak<MemStore>,
    wake: Arc<Notify>,
    shutdown: CancellationToken,
) -> Result<()> {
    debug!("TTL reaper started");

    loop {
        // Never hold a strong reference across an await point
        let next_deadline = match store.upgrade() {
            Some(store) => store.next_expiry(),
            None => break,
        };

        let timer = async {
            match next_deadline {
                Some(deadline) => sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("TTL reaper received shutdown signal");
                break;
            }
            _ = wake.notified() => {
                trace!("TTL reaper woken by new deadline");
            }
            _ = timer => {
                match store.upgrade() {
                    Some(store) => store.expire_due(Instant::now()),
                    None => break,
                }
            }
        }
    }

    debug!("TTL reaper stopped");
    Ok(())
}
