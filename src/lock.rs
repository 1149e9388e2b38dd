//! Coarse mutual exclusion built from `create` + `compare_and_delete`.
//!
//! Holding a lock means owning the key `key` with value `"locked"`. There is
//! no lock state beyond that entry:
//!
//! - `lock` polls `create` until it succeeds, sleeping a fixed interval
//!   derived from the TTL between attempts (see [`LockConfig`]). No queueing,
//!   no fairness, no backoff growth. Without `acquire_timeout_ms` it never
//!   gives up.
//! - `unlock` is a `compare_and_delete` of the entry `lock` returned. A stale
//!   or altered entry is rejected with `NotFound`.
//! - The TTL bounds how long a crashed holder can keep the lock.
//!
//! [`LockConfig`]: crate::LockConfig

use tokio::time::sleep;
use tokio::time::Instant;
use tracing::debug;
use tracing::trace;

use crate::constants::LOCK_VALUE;
use crate::KvEntry;
use crate::KvError;
use crate::KvFlags;
use crate::MemKv;
use crate::Result;

impl MemKv {
    /// Acquire the lock on `key`, held for at most `ttl` seconds (0 = no expiry).
    pub async fn lock(
        &self,
        key: &str,
        ttl: u64,
    ) -> Result<KvEntry> {
        let lock_config = self.config().lock;
        let interval = lock_config.retry_interval(ttl);
        let deadline = lock_config.acquire_timeout().map(|timeout| Instant::now() + timeout);
        let started = Instant::now();
        let mut attempts: u64 = 0;

        loop {
            attempts += 1;
            match self.create(key, LOCK_VALUE, ttl) {
                Ok(entry) => {
                    debug!(key, attempts, index = entry.modified_index, "Lock acquired");
                    return Ok(entry);
                }
                Err(e) if e.is_already_exists() => {
                    trace!(key, attempts, ?interval, "Lock held elsewhere, retrying");
                }
                Err(e) => return Err(e),
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(KvError::LockTimeout {
                            key: key.to_string(),
                            waited: started.elapsed(),
                        }
                        .into());
                    }
                    // last attempt lands on the deadline
                    interval.min(deadline - now)
                }
                None => interval,
            };

            sleep(pause).await;
        }
    }

    /// Release a lock acquired with [`MemKv::lock`]
    pub fn unlock(
        &self,
        entry: &KvEntry,
    ) -> Result<()> {
        self.compare_and_delete(entry, KvFlags::NONE)?;
        debug!(key = %entry.key, "Lock released");
        Ok(())
    }
}
