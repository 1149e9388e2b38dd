//! Versioned in-memory store
//!
//! - [`IndexAllocator`]: the store-wide logical clock
//! - [`KeyDomain`]: key namespacing applied on the way in and out
//! - [`MemStore`]: the authoritative map with CRUD and CAS semantics
//! - `ExpiryIndex` + `TtlReaper`: per-entry TTL expiry

mod domain;
mod entry;
mod expiry;
mod index;
mod mem_store;

pub use domain::*;
pub use entry::*;
pub(crate) use expiry::*;
pub use index::*;
pub use mem_store::*;
