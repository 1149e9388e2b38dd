use std::sync::Arc;
use std::time::Duration;

use memkv::Error;
use memkv::KvEntry;
use memkv::MemKv;
use memkv::MemKvConfig;
use memkv::Opaque;
use tokio::sync::mpsc;
use tokio::time::timeout;

pub const TEST_DOMAIN: &str = "pwx/test";

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// One callback invocation as seen by a test
#[derive(Debug)]
pub enum Delivery {
    Event { key: String, entry: KvEntry },
    Stopped { key: String },
}

pub fn new_kv() -> MemKv {
    MemKv::new(MemKvConfig::with_domain(TEST_DOMAIN)).expect("store should start inside a runtime")
}

pub fn no_opaque() -> Opaque {
    Arc::new(())
}

/// Watch callback that forwards every invocation and asks to stop when it
/// sees `stop_value`
pub fn recording_callback(
    tx: mpsc::UnboundedSender<Delivery>,
    stop_value: &'static [u8],
) -> impl FnMut(&str, &Opaque, Option<&KvEntry>, Option<&Error>) -> memkv::Result<()> + Send + 'static {
    move |key: &str, _opaque: &Opaque, entry: Option<&KvEntry>, error: Option<&Error>| {
        match (entry, error) {
            (Some(entry), None) => {
                let _ = tx.send(Delivery::Event {
                    key: key.to_string(),
                    entry: entry.clone(),
                });
                if entry.value == stop_value {
                    return Err(Error::Watch(memkv::WatchError::Stopped));
                }
                Ok(())
            }
            (None, Some(e)) => {
                assert!(e.is_watch_stopped(), "unexpected watch error: {e}");
                let _ = tx.send(Delivery::Stopped { key: key.to_string() });
                Ok(())
            }
            other => panic!("unexpected callback arguments: {other:?}"),
        }
    }
}

pub async fn next_delivery(rx: &mut mpsc::UnboundedReceiver<Delivery>) -> Delivery {
    timeout(WAIT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for watch delivery")
        .expect("watch callback dropped")
}
