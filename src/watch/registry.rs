use std::any::Any;
use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::async_task::spawn_task;
use crate::Error;
use crate::KeyDomain;
use crate::KvEntry;
use crate::KvError;
use crate::Result;
use crate::WatchConfig;
use crate::WatchError;

/// Caller-owned context handed back to every callback invocation
pub type Opaque = Arc<dyn Any + Send + Sync>;

/// Watch callback: `(key, opaque, entry, error)`.
///
/// Regular events carry `Some(entry)` and no error. The final invocation of a
/// torn-down watch carries no entry and `WatchError::Stopped`. Returning an
/// error from a regular event tears the watch down.
pub type WatchCallback =
    Box<dyn FnMut(&str, &Opaque, Option<&KvEntry>, Option<&Error>) -> Result<()> + Send + 'static>;

/// Which registry a watcher lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchKind {
    /// Exact key match
    Key,
    /// Any key starting with the prefix
    Tree,
}

/// Registry-side half of a watcher
#[derive(Debug)]
struct Watcher {
    id: u64,
    sender: mpsc::UnboundedSender<KvEntry>,
}

impl Watcher {
    fn send(
        &self,
        entry: &KvEntry,
    ) {
        if self.sender.send(entry.clone()).is_err() {
            trace!(watcher_id = self.id, key = %entry.key, "Watcher queue closed, event dropped");
        }
    }
}

#[derive(Debug, Default)]
struct WatchRegistryInner {
    /// Exact-key watchers, keyed by namespaced key
    keys: DashMap<String, Watcher>,

    /// Tree watchers, keyed by namespaced prefix
    trees: DashMap<String, Watcher>,

    next_id: AtomicU64,
}

impl WatchRegistryInner {
    fn map(
        &self,
        kind: WatchKind,
    ) -> &DashMap<String, Watcher> {
        match kind {
            WatchKind::Key => &self.keys,
            WatchKind::Tree => &self.trees,
        }
    }
}

/// Exact-key and prefix watch registries of one store
pub struct WatchRegistry {
    inner: Arc<WatchRegistryInner>,
    runtime: Handle,
    shutdown: CancellationToken,
    enabled: bool,
}

impl fmt::Debug for WatchRegistry {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("keys", &self.inner.keys.len())
            .field("trees", &self.inner.trees.len())
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

impl WatchRegistry {
    pub fn new(
        config: WatchConfig,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(WatchRegistryInner::default()),
            runtime,
            shutdown,
            enabled: config.enabled,
        }
    }

    /// Register `callback` on `key` (exact) or on the `key` prefix (tree).
    ///
    /// Fails with `AlreadyWatched` if the registry already holds a watcher
    /// for the same namespaced key or prefix, and with `Stopped` once the
    /// store has shut down.
    pub fn register(
        &self,
        kind: WatchKind,
        domain: &KeyDomain,
        key: &str,
        opaque: Opaque,
        callback: WatchCallback,
    ) -> Result<()> {
        if !self.enabled {
            return Err(KvError::Unsupported { operation: "watch" }.into());
        }

        if self.shutdown.is_cancelled() {
            return Err(WatchError::Stopped.into());
        }

        let stored_key = domain.qualify(key);
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, events) = mpsc::unbounded_channel();

        match self.inner.map(kind).entry(stored_key.clone()) {
            Entry::Occupied(_) => {
                return Err(WatchError::AlreadyWatched {
                    key: key.to_string(),
                }
                .into());
            }
            Entry::Vacant(slot) => {
                slot.insert(Watcher { id, sender });
            }
        }

        debug!(watcher_id = id, kind = ?kind, key = %stored_key, "Watcher registered");

        let dispatcher = WatchDispatcher {
            id,
            kind,
            key: stored_key,
            domain: domain.clone(),
            opaque,
            callback,
            events,
            registry: self.inner.clone(),
            shutdown: self.shutdown.clone(),
        };
        spawn_task(&self.runtime, "watch_dispatcher", dispatcher.run());

        Ok(())
    }

    /// Enqueue a mutation for every matching watcher.
    ///
    /// Called by the store while it still holds its write lock, which is what
    /// keeps every watcher's queue in index order. Never blocks.
    pub(crate) fn notify(
        &self,
        stored_key: &str,
        entry: &KvEntry,
    ) {
        if !self.enabled {
            return;
        }

        if let Some(watcher) = self.inner.keys.get(stored_key) {
            watcher.send(entry);
        }

        for watcher in self.inner.trees.iter() {
            if stored_key.starts_with(watcher.key().as_str()) {
                watcher.send(entry);
            }
        }
    }

    /// Whether a watcher is registered on the namespaced `key`
    pub fn is_watched(
        &self,
        kind: WatchKind,
        stored_key: &str,
    ) -> bool {
        self.inner.map(kind).contains_key(stored_key)
    }

    /// Number of live watchers of the given kind
    pub fn watcher_count(
        &self,
        kind: WatchKind,
    ) -> usize {
        self.inner.map(kind).len()
    }
}

/// Task-side half of a watcher: drains its queue in order and runs the callback
struct WatchDispatcher {
    id: u64,
    kind: WatchKind,
    key: String,
    domain: KeyDomain,
    opaque: Opaque,
    callback: WatchCallback,
    events: mpsc::UnboundedReceiver<KvEntry>,
    registry: Arc<WatchRegistryInner>,
    shutdown: CancellationToken,
}

impl WatchDispatcher {
    async fn run(mut self) -> Result<()> {
        loop {
            let entry = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!(watcher_id = self.id, key = %self.key, "Watch dispatcher received shutdown signal");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let entry = self.domain.detach(&entry);
            trace!(
                watcher_id = self.id,
                key = %entry.key,
                index = entry.modified_index,
                action = ?entry.action,
                "Dispatching watch event"
            );

            if let Err(e) = (self.callback)(&entry.key, &self.opaque, Some(&entry), None) {
                debug!(watcher_id = self.id, key = %self.key, error = ?e, "Watch callback requested stop");
                break;
            }
        }

        self.stop();
        Ok(())
    }

    /// Remove the watcher, then deliver the final `Stopped` invocation
    fn stop(&mut self) {
        let id = self.id;
        self.registry.map(self.kind).remove_if(&self.key, |_, watcher| watcher.id == id);

        let stopped = Error::Watch(WatchError::Stopped);
        if let Err(e) = (self.callback)(self.domain.strip(&self.key), &self.opaque, None, Some(&stopped)) {
            trace!(watcher_id = id, error = ?e, "Watch callback returned error on stop");
        }
        debug!(watcher_id = id, key = %self.key, "Watcher unregistered");
    }
}
