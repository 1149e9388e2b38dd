//! Watch mechanism for monitoring key changes
//!
//! Two independent registries: one for exact keys and one for key prefixes
//! (trees). At most one watcher may be registered per exact key and per exact
//! prefix string. A single mutation may wake both an exact-key watcher and any
//! number of tree watchers.
//!
//! ```text
//! ┌──────────────┐
//! │   MemStore   │  mutation under the store write lock
//! │ put/delete.. │
//! └──────┬───────┘
//!        │ notify() -> send() on each matching watcher queue [non-blocking]
//!        ▼
//! ┌──────────────────┐
//! │ Per-Watcher      │ (tokio mpsc, unbounded, FIFO)
//! │ Queues           │
//! └──────┬───────────┘
//!        │
//!        ▼
//! ┌──────────────────┐
//! │ Per-Watcher      │ (one tokio task each)
//! │ Dispatch Task    │ -> callback(key, opaque, entry, None)
//! └──────────────────┘
//! ```
//!
//! # Ordering
//!
//! Events are enqueued while the store's write lock is still held, and each
//! watcher drains its own queue from a single task. A watcher therefore sees
//! its events in strictly increasing index order, while the mutating call
//! never waits for callbacks. Delivery is eventually consistent with respect
//! to the mutating call's return.
//!
//! # Stop protocol
//!
//! When a callback returns an error the watch is torn down: the callback is
//! invoked exactly once more with `WatchError::Stopped`, the watcher is
//! removed from its registry, and queued events are discarded. Store shutdown
//! ends every watch the same way, and a watch registered after shutdown is
//! refused with `Stopped` without its callback ever running.

mod registry;


pub use registry::*;
