//! Holder of the single current DevTools endpoint address.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::error::UpstreamError;

/// Single-writer/multi-reader holder of the current endpoint address.
///
/// The watcher is the only writer in practice; every relay upgrade and
/// discovery request reads the value independently at the moment it is
/// handled. Updates are last-write-wins and readers never observe a torn
/// value. Cloning the registry produces another handle to the same state.
#[derive(Clone)]
pub struct EndpointRegistry {
    tx: watch::Sender<Option<String>>,
}

impl EndpointRegistry {
    /// Create an empty registry (no endpoint known yet).
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// The current endpoint address, or `None` if none has been announced.
    pub fn current(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    /// Publish a newly announced address.
    ///
    /// Empty addresses are ignored, and republishing the current address is a
    /// no-op — subscribers only see real transitions. Returns whether the
    /// value actually changed.
    pub fn set(&self, addr: &str) -> bool {
        if addr.is_empty() {
            return false;
        }
        let changed = self.tx.send_if_modified(|current| {
            if current.as_deref() == Some(addr) {
                false
            } else {
                *current = Some(addr.to_owned());
                true
            }
        });
        if changed {
            info!(url = addr, "devtools upstream updated");
        }
        changed
    }

    /// Block until an endpoint has been announced, or `timeout` elapses.
    pub async fn wait_for_initial(&self, timeout: Duration) -> Result<String, UpstreamError> {
        let mut rx = self.tx.subscribe();
        tokio::time::timeout(timeout, async move {
            loop {
                if let Some(addr) = rx.borrow_and_update().clone() {
                    return addr;
                }
                if rx.changed().await.is_err() {
                    // All senders gone; nothing will ever be announced.
                    std::future::pending::<()>().await;
                }
            }
        })
        .await
        .map_err(|_| UpstreamError::NotDiscovered { waited: timeout })
    }

    /// Subscribe to endpoint changes with latest-wins semantics.
    ///
    /// The receiver observes the newest value at each wakeup; intermediate
    /// values may be skipped, stale values are never re-delivered.
    pub fn subscribe(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for EndpointRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let reg = EndpointRegistry::new();
        assert_eq!(reg.current(), None);
    }

    #[test]
    fn set_then_current() {
        let reg = EndpointRegistry::new();
        assert!(reg.set("ws://127.0.0.1:9223/devtools/browser/abc"));
        assert_eq!(
            reg.current().as_deref(),
            Some("ws://127.0.0.1:9223/devtools/browser/abc")
        );
    }

    #[test]
    fn set_same_address_is_noop() {
        let reg = EndpointRegistry::new();
        assert!(reg.set("ws://a"));
        assert!(!reg.set("ws://a"));
        assert_eq!(reg.current().as_deref(), Some("ws://a"));
    }

    #[test]
    fn set_empty_ignored() {
        let reg = EndpointRegistry::new();
        assert!(!reg.set(""));
        assert_eq!(reg.current(), None);
        assert!(reg.set("ws://a"));
        assert!(!reg.set(""));
        assert_eq!(reg.current().as_deref(), Some("ws://a"));
    }

    #[test]
    fn last_write_wins_no_regression() {
        let reg = EndpointRegistry::new();
        let addrs = ["ws://a", "ws://b", "ws://c"];
        for addr in addrs {
            assert!(reg.set(addr));
            // Once replaced, a reader never sees an older value again.
            assert_eq!(reg.current().as_deref(), Some(addr));
        }
    }

    #[test]
    fn clones_share_state() {
        let reg = EndpointRegistry::new();
        let other = reg.clone();
        assert!(reg.set("ws://a"));
        assert_eq!(other.current().as_deref(), Some("ws://a"));
    }

    #[test]
    fn subscribe_sees_only_real_transitions() {
        let reg = EndpointRegistry::new();
        let mut rx = reg.subscribe();
        assert!(!rx.has_changed().unwrap());

        assert!(reg.set("ws://a"));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_deref(), Some("ws://a"));

        // Duplicate publish produces no wakeup.
        assert!(!reg.set("ws://a"));
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test]
    async fn wait_for_initial_times_out_when_nothing_announced() {
        let reg = EndpointRegistry::new();
        let err = reg
            .wait_for_initial(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::NotDiscovered { .. }));
    }

    #[tokio::test]
    async fn wait_for_initial_returns_immediately_when_known() {
        let reg = EndpointRegistry::new();
        assert!(reg.set("ws://a"));
        let addr = reg.wait_for_initial(Duration::from_secs(1)).await.unwrap();
        assert_eq!(addr, "ws://a");
    }

    #[tokio::test]
    async fn wait_for_initial_wakes_on_publish_from_other_task() {
        let reg = EndpointRegistry::new();
        let writer = reg.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(writer.set("ws://late"));
        });
        let addr = reg.wait_for_initial(Duration::from_secs(2)).await.unwrap();
        assert_eq!(addr, "ws://late");
        handle.await.unwrap();
    }
}
