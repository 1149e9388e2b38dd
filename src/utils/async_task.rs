use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;

use crate::Result;

/// Spawn a named background task on `runtime`, logging how it ended.
///
/// Background work in this crate (TTL reaper, watch dispatchers) has no
/// caller to report to, so a failing task is logged and dropped.
pub(crate) fn spawn_task<Fut>(
    runtime: &Handle,
    name: &str,
    task: Fut,
) -> JoinHandle<()>
where
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let name = name.to_string();
    runtime.spawn(async move {
        match task.await {
            Ok(()) => debug!("spawned task: {name} finished"),
            Err(e) => error!("spawned task: {name} stopped or encountered an error: {:?}", e),
        }
    })
}
