//! Log tailer that keeps the endpoint registry current.
//!
//! The supervisor writes the browser's stderr to a log file, and every
//! browser start emits a `DevTools listening on ws://…` line. The watcher
//! follows that file for the lifetime of the process, publishing each newly
//! announced URL to the [`EndpointRegistry`].
//!
//! The scrape is an inter-process signaling mechanism of last resort: the
//! pattern match lives in [`scan_line`] and the watcher only touches the
//! registry through its public API, so a structured notification source can
//! replace this module without the relay or discovery handlers noticing.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::UpstreamError;
use crate::registry::EndpointRegistry;

/// Announcement line pattern. The URL is everything up to the next whitespace.
static ANNOUNCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"listening on (wss?://\S+)").expect("announcement pattern is valid")
});

/// Delay before the first tail restart.
const MIN_BACKOFF: Duration = Duration::from_millis(250);
/// Ceiling for the restart backoff.
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Extract the announced endpoint URL from one log line, if present.
pub fn scan_line(line: &str) -> Option<&str> {
    ANNOUNCE_RE
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Tails the supervisor log and publishes announced endpoints.
///
/// Runs until cancelled. A missing log file is an expected startup race and
/// is retried quietly; any other tail failure is logged and retried with
/// exponential backoff capped at [`MAX_BACKOFF`].
pub struct EndpointWatcher {
    log_path: PathBuf,
    registry: EndpointRegistry,
}

impl EndpointWatcher {
    /// Create a watcher over `log_path` publishing into `registry`.
    pub fn new(log_path: impl Into<PathBuf>, registry: EndpointRegistry) -> Self {
        Self {
            log_path: log_path.into(),
            registry,
        }
    }

    /// Handle to the registry this watcher publishes into.
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// The last announced endpoint, or `None`.
    pub fn current(&self) -> Option<String> {
        self.registry.current()
    }

    /// Block until the first endpoint announcement, or `timeout` elapses.
    pub async fn wait_for_initial(&self, timeout: Duration) -> Result<String, UpstreamError> {
        self.registry.wait_for_initial(timeout).await
    }

    /// Tail the log until `cancel` fires, restarting dead tail sessions.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = MIN_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let progressed = self.tail_once(&cancel).await;
            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(backoff) => {}
            }
            // A session that read anything resets the backoff; a session that
            // went nowhere (missing file, spawn failure) backs off further.
            backoff = if progressed {
                MIN_BACKOFF
            } else {
                (backoff * 2).min(MAX_BACKOFF)
            };
        }
    }

    /// Run one tail session to completion. Returns whether any line was read.
    async fn tail_once(&self, cancel: &CancellationToken) -> bool {
        // `tail -f` on a missing file exits immediately; checking up front
        // keeps the expected startup race at debug severity.
        if tokio::fs::metadata(&self.log_path).await.is_err() {
            debug!(path = %self.log_path.display(), "supervisor log not found yet; will retry");
            return false;
        }

        let mut child = match Command::new("tail")
            .args(["-f", "-n", "+1"])
            .arg(&self.log_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                error!(error = %e, "failed to start tail");
                return false;
            }
        };
        let Some(stdout) = child.stdout.take() else {
            error!("tail stdout was not captured");
            return false;
        };

        let mut lines = BufReader::new(stdout).lines();
        let mut progressed = false;
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        progressed = true;
                        if let Some(url) = scan_line(&line) {
                            let _ = self.registry.set(url);
                        }
                    }
                    // EOF: the tail process died (log rotated away, killed).
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "tail read error");
                        break;
                    }
                },
            }
        }
        let _ = child.kill().await;
        progressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn scan_line_extracts_url() {
        let line = "DevTools listening on ws://127.0.0.1:9223/devtools/browser/abc-123";
        assert_eq!(
            scan_line(line),
            Some("ws://127.0.0.1:9223/devtools/browser/abc-123")
        );
    }

    #[test]
    fn scan_line_extracts_wss_url() {
        let line = "DevTools listening on wss://10.0.0.5:9223/devtools/browser/x";
        assert_eq!(scan_line(line), Some("wss://10.0.0.5:9223/devtools/browser/x"));
    }

    #[test]
    fn scan_line_stops_at_whitespace() {
        let line = "DevTools listening on ws://h:1/p trailing words";
        assert_eq!(scan_line(line), Some("ws://h:1/p"));
    }

    #[test]
    fn scan_line_ignores_unrelated_lines() {
        assert_eq!(scan_line("chromium started, pid 42"), None);
        assert_eq!(scan_line("listening on port 8080"), None);
        assert_eq!(scan_line(""), None);
    }

    #[tokio::test]
    async fn watcher_publishes_announcement_from_existing_log() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("chromium.log");
        std::fs::write(
            &log_path,
            "starting chromium\nDevTools listening on ws://127.0.0.1:9223/devtools/browser/aaa\n",
        )
        .unwrap();

        let registry = EndpointRegistry::new();
        let watcher = EndpointWatcher::new(&log_path, registry.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        let addr = registry
            .wait_for_initial(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(addr, "ws://127.0.0.1:9223/devtools/browser/aaa");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_picks_up_appended_announcement() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("chromium.log");
        std::fs::write(&log_path, "boot\n").unwrap();

        let registry = EndpointRegistry::new();
        let watcher = EndpointWatcher::new(&log_path, registry.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        // Give the tail session a moment to attach before appending.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let mut file = std::fs::OpenOptions::new()
            .append(true)
            .open(&log_path)
            .unwrap();
        writeln!(file, "DevTools listening on ws://127.0.0.1:9224/devtools/browser/bbb").unwrap();
        drop(file);

        let addr = registry
            .wait_for_initial(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(addr, "ws://127.0.0.1:9224/devtools/browser/bbb");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_retries_until_log_appears() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("not-yet.log");

        let registry = EndpointRegistry::new();
        let watcher = EndpointWatcher::new(&log_path, registry.clone());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        // File shows up only after the watcher has already retried.
        tokio::time::sleep(Duration::from_millis(400)).await;
        std::fs::write(
            &log_path,
            "DevTools listening on ws://127.0.0.1:9225/devtools/browser/ccc\n",
        )
        .unwrap();

        let addr = registry
            .wait_for_initial(Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(addr, "ws://127.0.0.1:9225/devtools/browser/ccc");

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn watcher_stops_on_cancel() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("missing.log");
        let watcher = EndpointWatcher::new(&log_path, EndpointRegistry::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(watcher.run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("watcher should exit promptly on cancel")
            .unwrap();
    }

    #[tokio::test]
    async fn repeated_announcement_publishes_once() {
        let registry = EndpointRegistry::new();
        let mut rx = registry.subscribe();

        let line = "DevTools listening on ws://127.0.0.1:9223/devtools/browser/dup";
        let url = scan_line(line).unwrap();
        assert!(registry.set(url));
        let _ = rx.borrow_and_update();
        assert!(!registry.set(url));
        assert!(!rx.has_changed().unwrap());
    }
}
