use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::ExpiryIndex;
use super::IndexAllocator;
use super::KeyDomain;
use super::TtlReaper;
use crate::constants::INTERNAL_KEY_MARKER;
use crate::watch::Opaque;
use crate::watch::WatchCallback;
use crate::watch::WatchKind;
use crate::watch::WatchRegistry;
use crate::Error;
use crate::KvAction;
use crate::KvEntry;
use crate::KvError;
use crate::KvFlags;
use crate::Result;
use crate::WatchConfig;

/// Everything guarded by the store lock
#[derive(Debug, Default)]
struct StoreState {
    /// namespaced key -> current entry
    entries: HashMap<String, KvEntry>,

    /// pending expiry deadlines, by namespaced key
    expiry: ExpiryIndex,
}

/// The authoritative in-memory map of one store instance.
///
/// All operations take an external key together with the `KeyDomain` of the
/// caller; the domain is applied before the map is touched and stripped
/// from every entry handed back. Mutations (including the read half of
/// create/update/CAS) run under the write lock; reads take the read lock.
pub struct MemStore {
    state: RwLock<StoreState>,
    index: IndexAllocator,
    watches: WatchRegistry,
    reaper: TtlReaper,
    shutdown: CancellationToken,
}

impl fmt::Debug for MemStore {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemStore")
            .field("entries", &self.state.read().entries.len())
            .field("index", &self.index.current())
            .field("watches", &self.watches)
            .finish_non_exhaustive()
    }
}

impl MemStore {
    /// Build a store and start its TTL reaper on `runtime`.
    pub fn new(
        watch_config: WatchConfig,
        runtime: Handle,
    ) -> Arc<Self> {
        let shutdown = CancellationToken::new();
        let store = Arc::new(Self {
            state: RwLock::new(StoreState {
                entries: HashMap::new(),
                expiry: ExpiryIndex::new(),
            }),
            index: IndexAllocator::new(),
            watches: WatchRegistry::new(watch_config, runtime.clone(), shutdown.child_token()),
            reaper: TtlReaper::new(),
            shutdown,
        });

        store
            .reaper
            .start(Arc::downgrade(&store), &runtime, store.shutdown.child_token());
        store
    }

    /// Stop the TTL reaper and every watch dispatcher.
    ///
    /// Data stays readable and writable; keys no longer expire and watchers
    /// receive their final `Stopped` invocation.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            debug!("Shutting down kv-mem store");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Last index allocated by any mutation
    pub fn current_index(&self) -> u64 {
        self.index.current()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn watches(&self) -> &WatchRegistry {
        &self.watches
    }

    //-----------------------------------------------------------
    // Reads

    pub fn get(
        &self,
        domain: &KeyDomain,
        key: &str,
    ) -> Result<KvEntry> {
        let stored_key = domain.qualify(key);
        let state = self.state.read();
        state
            .entries
            .get(&stored_key)
            .map(|entry| domain.detach(entry))
            .ok_or_else(|| not_found(key))
    }

    /// Every live entry under `prefix`, excluding internal sub-paths.
    /// No ordering guarantee.
    pub fn enumerate(
        &self,
        domain: &KeyDomain,
        prefix: &str,
    ) -> Vec<KvEntry> {
        let stored_prefix = domain.qualify(prefix);
        let state = self.state.read();
        state
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(&stored_prefix) && !key.contains(INTERNAL_KEY_MARKER))
            .map(|(_, entry)| domain.detach(entry))
            .collect()
    }

    //-----------------------------------------------------------
    // Writes

    pub fn put(
        &self,
        domain: &KeyDomain,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> KvEntry {
        let mut state = self.state.write();
        let entry = self.put_locked(&mut state, domain.qualify(key), value, ttl);
        domain.detach(&entry)
    }

    /// Insert only if absent; the check and the insert are one critical section.
    pub fn create(
        &self,
        domain: &KeyDomain,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> Result<KvEntry> {
        let stored_key = domain.qualify(key);
        let mut state = self.state.write();

        if let Some(existing) = state.entries.get(&stored_key) {
            return Err(KvError::AlreadyExists {
                key: key.to_string(),
                existing: Box::new(domain.detach(existing)),
            }
            .into());
        }

        let entry = self.put_locked(&mut state, stored_key, value, ttl);
        Ok(domain.detach(&entry))
    }

    /// Write only if present
    pub fn update(
        &self,
        domain: &KeyDomain,
        key: &str,
        value: Vec<u8>,
        ttl: u64,
    ) -> Result<KvEntry> {
        let stored_key = domain.qualify(key);
        let mut state = self.state.write();

        if !state.entries.contains_key(&stored_key) {
            return Err(not_found(key));
        }

        let entry = self.put_locked(&mut state, stored_key, value, ttl);
        Ok(domain.detach(&entry))
    }

    pub fn delete(
        &self,
        domain: &KeyDomain,
        key: &str,
    ) -> Result<KvEntry> {
        let mut state = self.state.write();
        self.delete_locked(&mut state, &domain.qualify(key))
            .map(|entry| domain.detach(&entry))
            .ok_or_else(|| not_found(key))
    }

    /// Delete every enumerable key under `prefix`.
    ///
    /// Best effort: every matching key is attempted even if some fail, and the
    /// last failure is reported.
    pub fn delete_tree(
        &self,
        domain: &KeyDomain,
        prefix: &str,
    ) -> Result<()> {
        let keys = self.enumerate(domain, prefix).into_iter().map(|entry| entry.key);
        self.delete_each(domain, keys)
    }

    /// Delete `keys` one by one, continuing past failures.
    /// A key may vanish between enumeration and its delete.
    pub(super) fn delete_each(
        &self,
        domain: &KeyDomain,
        keys: impl IntoIterator<Item = String>,
    ) -> Result<()> {
        let mut last_error = None;

        for key in keys {
            if let Err(e) = self.delete(domain, &key) {
                warn!(key = %key, error = %e, "delete_tree: failed to delete key");
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Conditionally overwrite `entry.key` with `entry.value`.
    ///
    /// - `KvFlags::MODIFIED_INDEX`: `entry.modified_index` must equal the
    ///   store's current global index, i.e. nothing was written anywhere since
    /// - `prev_value`: the stored value must equal it byte for byte
    ///
    /// Both checks and the write happen under one write lock. The new
    /// state carries no TTL.
    pub fn compare_and_set(
        &self,
        domain: &KeyDomain,
        entry: &KvEntry,
        flags: KvFlags,
        prev_value: Option<&[u8]>,
    ) -> Result<KvEntry> {
        let stored_key = domain.qualify(&entry.key);
        let mut state = self.state.write();

        if flags.contains(KvFlags::MODIFIED_INDEX) && entry.modified_index != self.index.current() {
            trace!(
                key = %stored_key,
                expected = entry.modified_index,
                current = self.index.current(),
                "compare_and_set: index mismatch"
            );
            return Err(value_mismatch(&entry.key));
        }

        let current = state.entries.get(&stored_key).ok_or_else(|| not_found(&entry.key))?;
        if let Some(prev_value) = prev_value {
            if current.value != prev_value {
                return Err(value_mismatch(&entry.key));
            }
        }

        let updated = self.put_locked(&mut state, stored_key, entry.value.clone(), 0);
        Ok(domain.detach(&updated))
    }

    /// Delete `entry.key` only if its stored value equals `entry.value`.
    ///
    /// Only `KvFlags::NONE` is supported. A value mismatch is reported as
    /// `NotFound`: the entry the caller holds no longer exists.
    pub fn compare_and_delete(
        &self,
        domain: &KeyDomain,
        entry: &KvEntry,
        flags: KvFlags,
    ) -> Result<KvEntry> {
        if !flags.is_empty() {
            return Err(KvError::Unsupported {
                operation: "compare_and_delete with flags",
            }
            .into());
        }

        let stored_key = domain.qualify(&entry.key);
        let mut state = self.state.write();

        match state.entries.get(&stored_key) {
            Some(current) if current.value == entry.value => {}
            _ => return Err(not_found(&entry.key)),
        }

        self.delete_locked(&mut state, &stored_key)
            .map(|deleted| domain.detach(&deleted))
            .ok_or_else(|| not_found(&entry.key))
    }

    //-----------------------------------------------------------
    // Watches

    pub fn watch(
        &self,
        kind: WatchKind,
        domain: &KeyDomain,
        key: &str,
        opaque: Opaque,
        callback: WatchCallback,
    ) -> Result<()> {
        self.watches.register(kind, domain, key, opaque, callback)
    }

    //-----------------------------------------------------------
    // Expiry

    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.state.read().expiry.next_deadline()
    }

    /// Remaining deadline of a key, if it has one
    pub fn expiration(
        &self,
        domain: &KeyDomain,
        key: &str,
    ) -> Option<Instant> {
        self.state.read().expiry.get_expiration(&domain.qualify(key))
    }

    /// Number of keys with a pending expiry deadline
    pub fn pending_expiries(&self) -> usize {
        self.state.read().expiry.len()
    }

    /// Delete every key whose deadline is at or before `now`
    pub(crate) fn expire_due(
        &self,
        now: Instant,
    ) {
        let mut state = self.state.write();
        for key in state.expiry.take_expired(now) {
            match self.delete_locked(&mut state, &key) {
                Some(entry) => debug!(key = %key, index = entry.modified_index, "Key expired"),
                None => debug!(key = %key, "Expired key was already gone"),
            }
        }
    }

    //-----------------------------------------------------------
    // Locked helpers

    /// Allocate an index and write `value`, in place if the key exists.
    /// Returns the stored (namespaced) form.
    fn put_locked(
        &self,
        state: &mut StoreState,
        stored_key: String,
        value: Vec<u8>,
        ttl: u64,
    ) -> KvEntry {
        // Arm expiry first: nothing below may fail once the index is taken
        if ttl == 0 {
            state.expiry.unregister(&stored_key);
        } else if state.expiry.register(&stored_key, ttl).is_some() {
            self.reaper.wake();
        } else {
            debug!(key = %stored_key, ttl, "TTL beyond representable deadline, key will not expire");
        }

        let index = self.index.next();

        let entry = match state.entries.entry(stored_key) {
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                entry.value = value;
                entry.ttl = ttl;
                entry.stamp(KvAction::Set, index);
                entry.clone()
            }
            Entry::Vacant(slot) => {
                let key = slot.key().clone();
                slot.insert(KvEntry::new(key, value, ttl, index)).clone()
            }
        };

        trace!(key = %entry.key, index, action = ?entry.action, ttl, "Applied put");
        self.watches.notify(&entry.key, &entry);
        entry
    }

    /// Remove `stored_key`, stamping the removed entry with a fresh index
    fn delete_locked(
        &self,
        state: &mut StoreState,
        stored_key: &str,
    ) -> Option<KvEntry> {
        let mut entry = state.entries.remove(stored_key)?;
        let index = self.index.next();
        entry.stamp(KvAction::Delete, index);
        state.expiry.unregister(stored_key);

        trace!(key = %stored_key, index, "Applied delete");
        self.watches.notify(stored_key, &entry);
        Some(entry)
    }
}

impl Drop for MemStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn not_found(key: &str) -> Error {
    KvError::NotFound {
        key: key.to_string(),
    }
    .into()
}

fn value_mismatch(key: &str) -> Error {
    KvError::ValueMismatch {
        key: key.to_string(),
    }
    .into()
}
