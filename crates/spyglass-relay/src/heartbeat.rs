//! Liveness policing of the inbound peer.
//!
//! The relayed protocol may be legitimately idle for long stretches — a
//! client can stay attached to a page without issuing a single command — so
//! network-level keepalive alone cannot distinguish "quiet" from "vanished".
//! The session therefore runs its own ping/pong probe against the client,
//! orthogonal to whatever traffic is being relayed: once the client has been
//! silent past the idle threshold, a ping goes out; a pong must come back
//! within the grace period or the peer is declared dead.

use std::time::{Duration, Instant};

/// Heartbeat timing knobs.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// How often the heartbeat task wakes up to evaluate the session.
    pub interval: Duration,
    /// Client silence beyond this triggers a probe.
    pub idle_threshold: Duration,
    /// An unanswered probe older than this declares the peer dead.
    pub grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(30),
            grace: Duration::from_secs(10),
        }
    }
}

/// What the heartbeat task should do on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    /// Nothing to do.
    Idle,
    /// Send a ping to the client.
    SendPing,
    /// The client never answered; tear the session down.
    DeclareDead,
}

/// Per-session heartbeat bookkeeping.
///
/// Shared between the inbound pump (which records activity and pongs) and
/// the heartbeat task (which probes). Protected by a plain mutex in the
/// session; nothing here blocks.
#[derive(Debug)]
pub struct HeartbeatState {
    last_client_activity: Instant,
    last_ping_sent: Option<Instant>,
    last_pong_received: Option<Instant>,
    ping_outstanding: bool,
}

impl HeartbeatState {
    /// Fresh state; the accept time counts as client activity.
    pub fn new(now: Instant) -> Self {
        Self {
            last_client_activity: now,
            last_ping_sent: None,
            last_pong_received: None,
            ping_outstanding: false,
        }
    }

    /// Any frame read from the client resets the inactivity clock.
    pub fn record_client_activity(&mut self, now: Instant) {
        self.last_client_activity = now;
    }

    /// A pong from the client clears the outstanding probe.
    pub fn record_pong(&mut self, now: Instant) {
        self.last_pong_received = Some(now);
        self.ping_outstanding = false;
    }

    /// When the client last answered a probe, if it ever has.
    pub fn last_pong_received(&self) -> Option<Instant> {
        self.last_pong_received
    }

    /// A probe was written to the client.
    pub fn record_ping_sent(&mut self, now: Instant) {
        self.last_ping_sent = Some(now);
        self.ping_outstanding = true;
    }

    /// Whether a probe is currently awaiting its pong.
    pub fn ping_outstanding(&self) -> bool {
        self.ping_outstanding
    }

    /// Evaluate the session at `now`.
    pub fn on_tick(&self, now: Instant, config: &HeartbeatConfig) -> HeartbeatAction {
        if self.ping_outstanding {
            match self.last_ping_sent {
                Some(sent) if now.duration_since(sent) > config.grace => {
                    HeartbeatAction::DeclareDead
                }
                _ => HeartbeatAction::Idle,
            }
        } else if now.duration_since(self.last_client_activity) >= config.idle_threshold {
            HeartbeatAction::SendPing
        } else {
            HeartbeatAction::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(30),
            grace: Duration::from_secs(10),
        }
    }

    #[test]
    fn default_timings() {
        let cfg = HeartbeatConfig::default();
        assert_eq!(cfg.interval, Duration::from_secs(5));
        assert_eq!(cfg.idle_threshold, Duration::from_secs(30));
        assert_eq!(cfg.grace, Duration::from_secs(10));
    }

    #[test]
    fn quiet_but_recent_client_is_left_alone() {
        let start = Instant::now();
        let state = HeartbeatState::new(start);
        let tick = start + Duration::from_secs(29);
        assert_eq!(state.on_tick(tick, &config()), HeartbeatAction::Idle);
    }

    #[test]
    fn idle_threshold_triggers_single_probe() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start);
        let tick = start + Duration::from_secs(30);
        assert_eq!(state.on_tick(tick, &config()), HeartbeatAction::SendPing);

        // While the probe is outstanding, continued inactivity does not
        // trigger another ping.
        state.record_ping_sent(tick);
        let later = tick + Duration::from_secs(5);
        assert_eq!(state.on_tick(later, &config()), HeartbeatAction::Idle);
    }

    #[test]
    fn pong_clears_probe_and_allows_future_probes() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start);
        assert_eq!(state.last_pong_received(), None);

        let probe_at = start + Duration::from_secs(30);
        state.record_ping_sent(probe_at);
        let pong_at = probe_at + Duration::from_secs(1);
        state.record_pong(pong_at);
        assert!(!state.ping_outstanding());
        assert_eq!(state.last_pong_received(), Some(pong_at));

        // The pong itself was read as client activity, so the inactivity
        // clock restarts from there.
        state.record_client_activity(probe_at + Duration::from_secs(1));
        let tick = probe_at + Duration::from_secs(2);
        assert_eq!(state.on_tick(tick, &config()), HeartbeatAction::Idle);

        let much_later = probe_at + Duration::from_secs(40);
        assert_eq!(state.on_tick(much_later, &config()), HeartbeatAction::SendPing);
    }

    #[test]
    fn unanswered_probe_declares_dead_after_grace() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start);
        let probe_at = start + Duration::from_secs(30);
        state.record_ping_sent(probe_at);

        let within_grace = probe_at + Duration::from_secs(10);
        assert_eq!(state.on_tick(within_grace, &config()), HeartbeatAction::Idle);

        let past_grace = probe_at + Duration::from_secs(11);
        assert_eq!(
            state.on_tick(past_grace, &config()),
            HeartbeatAction::DeclareDead
        );
    }

    #[test]
    fn activity_resets_inactivity_clock() {
        let start = Instant::now();
        let mut state = HeartbeatState::new(start);
        state.record_client_activity(start + Duration::from_secs(25));
        let tick = start + Duration::from_secs(40);
        // Only 15s since last activity — no probe yet.
        assert_eq!(state.on_tick(tick, &config()), HeartbeatAction::Idle);
    }
}
