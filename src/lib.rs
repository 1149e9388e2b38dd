//! In-memory, single-process key-value backend.
//!
//! Versioned CRUD over byte values with a store-wide monotonically increasing
//! index, key-domain namespacing, prefix enumeration and subtree deletion,
//! compare-and-set / compare-and-delete, asynchronous watches on keys and
//! prefixes, per-entry TTL expiry, and a polling lock built on top of them.
//! Nothing is persisted; dropping the store loses all data and watchers.

mod codec;
mod config;
mod errors;
mod kv;
mod lock;
mod store;
mod utils;
pub mod constants;
pub mod watch;

pub use codec::*;
pub use config::*;
pub use errors::*;
pub use kv::*;
pub use store::*;
pub(crate) use utils::*;

pub use constants::NAME;
pub use watch::Opaque;
pub use watch::WatchKind;
