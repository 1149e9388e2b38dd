// -
// Backend identity

/// Name of this KV backend implementation
pub const NAME: &str = "kv-mem";

// -
// Key conventions

/// Keys containing this marker are reserved for internal sub-paths
/// (locks, metadata) and never show up in enumeration.
pub const INTERNAL_KEY_MARKER: &str = "/_";

/// Separator appended to a non-empty domain
pub(crate) const DOMAIN_SEPARATOR: char = '/';

/// Value written to a key while a lock is held on it
pub const LOCK_VALUE: &[u8] = b"locked";

// -
// Configuration

/// Environment variable prefix, e.g. `MEMKV__LOCK__TTL_DIVISOR=5`
pub(crate) const CONFIG_ENV_PREFIX: &str = "MEMKV";

/// Environment variable naming an optional config file
pub(crate) const CONFIG_PATH_ENV: &str = "CONFIG_PATH";
