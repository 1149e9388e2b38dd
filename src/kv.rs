//! Public, domain-scoped handle on an in-memory store.
//!
//! [`MemKv`] is what callers hold. Every key passes through the handle's
//! [`KeyDomain`] before reaching the shared [`MemStore`], and every returned
//! entry is a detached copy with the domain stripped again.
//!
//! # Usage
//! ```rust,ignore
//! let kv = MemKv::new(MemKvConfig::with_domain("pwx/test"))?;
//! let entry = kv.create("create/foo", b"bar", 0)?;
//! assert_eq!(entry.action, KvAction::Create);
//! kv.delete("create/foo")?;
//! ```

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::runtime::Handle;

use crate::constants::NAME;
use crate::watch::Opaque;
use crate::watch::WatchKind;
use crate::Error;
use crate::KeyDomain;
use crate::KvEntry;
use crate::KvError;
use crate::KvFlags;
use crate::MemKvConfig;
use crate::MemStore;
use crate::Result;

/// Transactions are not implemented by this backend; no value of this type
/// can ever exist.
#[derive(Debug)]
pub enum Tx {}

/// Cloneable handle on a store, scoped to one key domain
#[derive(Clone)]
pub struct MemKv {
    store: Arc<MemStore>,
    domain: KeyDomain,
    config: Arc<MemKvConfig>,
}

impl fmt::Debug for MemKv {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemKv")
            .field("domain", &self.domain.as_str())
            .field("store", &self.store)
            .finish()
    }
}

impl fmt::Display for MemKv {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(NAME)
    }
}

impl MemKv {
    /// Validate `config` and build a fresh store.
    ///
    /// Must be called from within a tokio runtime: the TTL reaper and watch
    /// dispatchers run as tasks on it.
    pub fn new(config: MemKvConfig) -> Result<Self> {
        let config = config.validate()?;
        let runtime = Handle::try_current()?;
        let store = MemStore::new(config.watch, runtime);

        Ok(Self {
            store,
            domain: KeyDomain::new(&config.domain),
            config: Arc::new(config),
        })
    }

    /// Another handle over the same store, under a different domain.
    ///
    /// Index counter, watchers and expiry are shared with `self`.
    pub fn scoped(
        &self,
        domain: &str,
    ) -> MemKv {
        MemKv {
            store: self.store.clone(),
            domain: KeyDomain::new(domain),
            config: self.config.clone(),
        }
    }

    pub fn name(&self) -> &'static str {
        NAME
    }

    /// Normalized domain of this handle (ends with `/` unless empty)
    pub fn domain(&self) -> &str {
        self.domain.as_str()
    }

    pub fn config(&self) -> &MemKvConfig {
        &self.config
    }

    /// Last index allocated by any mutation on the store
    pub fn current_index(&self) -> u64 {
        self.store.current_index()
    }

    /// Stop TTL expiry and end every watch on the store
    pub fn shutdown(&self) {
        self.store.shutdown();
    }

    //-----------------------------------------------------------
    // Reads

    pub fn get(
        &self,
        key: &str,
    ) -> Result<KvEntry> {
        self.store.get(&self.domain, key)
    }

    /// `get` followed by a decode with the configured codec.
    ///
    /// A decode failure is a `CodecError::Decode`, distinct from `NotFound`.
    pub fn get_value<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<(KvEntry, T)> {
        let entry = self.get(key)?;
        let value = self.config.codec.decode(key, &entry.value)?;
        Ok((entry, value))
    }

    pub fn enumerate(
        &self,
        prefix: &str,
    ) -> Result<Vec<KvEntry>> {
        Ok(self.store.enumerate(&self.domain, prefix))
    }

    /// Listing keys by separator is not supported
    pub fn keys(
        &self,
        _prefix: &str,
        _separator: &str,
    ) -> Result<Vec<String>> {
        Err(KvError::Unsupported { operation: "keys" }.into())
    }

    //-----------------------------------------------------------
    // Writes

    pub fn put(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        ttl: u64,
    ) -> Result<KvEntry> {
        Ok(self.store.put(&self.domain, key, value.as_ref().to_vec(), ttl))
    }

    /// `put` of a value encoded with the configured codec
    pub fn put_value<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: u64,
    ) -> Result<KvEntry> {
        let bytes = self.config.codec.encode(value)?;
        Ok(self.store.put(&self.domain, key, bytes, ttl))
    }

    pub fn create(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        ttl: u64,
    ) -> Result<KvEntry> {
        self.store.create(&self.domain, key, value.as_ref().to_vec(), ttl)
    }

    pub fn update(
        &self,
        key: &str,
        value: impl AsRef<[u8]>,
        ttl: u64,
    ) -> Result<KvEntry> {
        self.store.update(&self.domain, key, value.as_ref().to_vec(), ttl)
    }

    pub fn delete(
        &self,
        key: &str,
    ) -> Result<KvEntry> {
        self.store.delete(&self.domain, key)
    }

    pub fn delete_tree(
        &self,
        prefix: &str,
    ) -> Result<()> {
        self.store.delete_tree(&self.domain, prefix)
    }

    pub fn compare_and_set(
        &self,
        entry: &KvEntry,
        flags: KvFlags,
        prev_value: Option<&[u8]>,
    ) -> Result<KvEntry> {
        self.store.compare_and_set(&self.domain, entry, flags, prev_value)
    }

    pub fn compare_and_delete(
        &self,
        entry: &KvEntry,
        flags: KvFlags,
    ) -> Result<KvEntry> {
        self.store.compare_and_delete(&self.domain, entry, flags)
    }

    /// Multi-key transactions are not supported
    pub fn tx_new(&self) -> Result<Tx> {
        Err(KvError::Unsupported { operation: "transactions" }.into())
    }

    //-----------------------------------------------------------
    // Watches

    /// Watch one exact key
    pub fn watch_key<F>(
        &self,
        key: &str,
        opaque: Opaque,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&str, &Opaque, Option<&KvEntry>, Option<&Error>) -> Result<()> + Send + 'static,
    {
        self.store
            .watch(WatchKind::Key, &self.domain, key, opaque, Box::new(callback))
    }

    /// Watch every key under `prefix`
    pub fn watch_tree<F>(
        &self,
        prefix: &str,
        opaque: Opaque,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(&str, &Opaque, Option<&KvEntry>, Option<&Error>) -> Result<()> + Send + 'static,
    {
        self.store
            .watch(WatchKind::Tree, &self.domain, prefix, opaque, Box::new(callback))
    }

    /// Number of live watchers of the given kind on the store
    pub fn watcher_count(
        &self,
        kind: WatchKind,
    ) -> usize {
        self.store.watches().watcher_count(kind)
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &Arc<MemStore> {
        &self.store
    }
}
