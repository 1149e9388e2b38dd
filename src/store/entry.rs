use std::fmt;
use std::ops::BitOr;

use serde::Deserialize;
use serde::Serialize;

/// How an entry arrived at its current state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KvAction {
    /// First write of a key
    Create,
    /// Any later write of a live key
    Set,
    /// Terminal state reported by a delete
    Delete,
}

/// The unit of storage.
///
/// While stored, `key` is fully namespaced. Every entry handed out by the
/// public API is a detached copy whose key has the domain stripped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
    /// Seconds-to-live requested by the write that produced this state (0 = none)
    pub ttl: u64,
    /// Index of the write that first created the key. Immutable.
    pub created_index: u64,
    /// Index of the most recent mutation
    pub modified_index: u64,
    /// Global "as of" index of this view; equals `modified_index`
    pub kvdb_index: u64,
    pub action: KvAction,
}

impl KvEntry {
    pub(crate) fn new(
        key: String,
        value: Vec<u8>,
        ttl: u64,
        index: u64,
    ) -> Self {
        Self {
            key,
            value,
            ttl,
            created_index: index,
            modified_index: index,
            kvdb_index: index,
            action: KvAction::Create,
        }
    }

    /// Stamp a mutation onto the entry in place, preserving its identity
    pub(crate) fn stamp(
        &mut self,
        action: KvAction,
        index: u64,
    ) {
        self.action = action;
        self.modified_index = index;
        self.kvdb_index = index;
    }
}

/// Precondition selector for compare-and-set / compare-and-delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct KvFlags(u32);

impl KvFlags {
    /// No index precondition
    pub const NONE: KvFlags = KvFlags(0);

    /// Require `entry.modified_index` to equal the store's current global index
    pub const MODIFIED_INDEX: KvFlags = KvFlags(1);

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub const fn contains(
        &self,
        other: KvFlags,
    ) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for KvFlags {
    type Output = KvFlags;

    fn bitor(
        self,
        rhs: KvFlags,
    ) -> KvFlags {
        KvFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for KvFlags {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u32> for KvFlags {
    fn from(bits: u32) -> Self {
        KvFlags(bits)
    }
}
