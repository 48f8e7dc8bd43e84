//! One relayed client-to-browser pairing.
//!
//! A session runs three tasks: an inbound pump (client → upstream), an
//! outbound pump (upstream → client), and a heartbeat that polices the
//! client's liveness. The first error pushed onto the shared channel — or a
//! process-wide cancellation — ends the session; the supervisor alone closes
//! both connections, so teardown happens exactly once no matter how many
//! tasks fail at the same time.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, gauge};
use tokio::sync::{Mutex, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::conn::{FrameSink, FrameStream};
use crate::error::RelayError;
use crate::frame::Frame;
use crate::heartbeat::{HeartbeatAction, HeartbeatConfig, HeartbeatState};
use crate::metrics::{
    RELAY_HEARTBEAT_TIMEOUTS_TOTAL, RELAY_SESSIONS_ACTIVE, RELAY_SESSIONS_TOTAL,
};

/// Per-session knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionConfig {
    /// Heartbeat timings.
    pub heartbeat: HeartbeatConfig,
    /// Log every relayed protocol message with its direction.
    pub log_messages: bool,
}

/// Relay frames between the two connections until one side fails, the
/// heartbeat declares the client dead, or `cancel` fires.
///
/// Returns the error that ended the session, or `None` when it was ended by
/// cancellation. Both connections are closed before this returns.
pub async fn run_session<CR, CW, UR, UW>(
    client_rx: CR,
    client_tx: CW,
    upstream_rx: UR,
    upstream_tx: UW,
    config: SessionConfig,
    cancel: CancellationToken,
) -> Option<RelayError>
where
    CR: FrameStream + 'static,
    CW: FrameSink + 'static,
    UR: FrameStream + 'static,
    UW: FrameSink + 'static,
{
    counter!(RELAY_SESSIONS_TOTAL).increment(1);
    gauge!(RELAY_SESSIONS_ACTIVE).increment(1.0);

    // Single-writer guard: the inbound pump and the heartbeat both write to
    // the client. The upstream guard exists only so teardown can reach the
    // half owned by the inbound pump.
    let client_tx = Arc::new(Mutex::new(client_tx));
    let upstream_tx = Arc::new(Mutex::new(upstream_tx));
    let heartbeat = Arc::new(parking_lot::Mutex::new(HeartbeatState::new(Instant::now())));
    let (err_tx, mut err_rx) = mpsc::channel::<RelayError>(4);

    let inbound = tokio::spawn(pump_client(
        client_rx,
        Arc::clone(&client_tx),
        Arc::clone(&upstream_tx),
        Arc::clone(&heartbeat),
        err_tx.clone(),
        config.log_messages,
    ));
    let outbound = tokio::spawn(pump_upstream(
        upstream_rx,
        Arc::clone(&client_tx),
        err_tx.clone(),
        config.log_messages,
    ));
    let prober = tokio::spawn(heartbeat_loop(
        Arc::clone(&client_tx),
        Arc::clone(&heartbeat),
        err_tx,
        config.heartbeat,
        cancel.clone(),
    ));

    let reason = tokio::select! {
        () = cancel.cancelled() => None,
        err = err_rx.recv() => err,
    };

    inbound.abort();
    outbound.abort();
    prober.abort();

    // The supervisor is the only closer; each connection is closed exactly
    // once regardless of which task (or cancellation) ended the session.
    {
        let mut tx = client_tx.lock().await;
        let _ = tx.close().await;
    }
    {
        let mut tx = upstream_tx.lock().await;
        let _ = tx.close().await;
    }

    match &reason {
        Some(err) if err.is_heartbeat_timeout() => {
            counter!(RELAY_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            warn!("client ping timeout; closing devtools websocket");
        }
        Some(err) => debug!(reason = %err, "relay session ended"),
        None => debug!("relay session cancelled"),
    }
    gauge!(RELAY_SESSIONS_ACTIVE).decrement(1.0);
    reason
}

/// Client → upstream pump. Also owns the heartbeat's view of client
/// activity and answers client pings locally.
async fn pump_client<CR, CW, UW>(
    mut client_rx: CR,
    client_tx: Arc<Mutex<CW>>,
    upstream_tx: Arc<Mutex<UW>>,
    heartbeat: Arc<parking_lot::Mutex<HeartbeatState>>,
    err_tx: mpsc::Sender<RelayError>,
    log_messages: bool,
) where
    CR: FrameStream,
    CW: FrameSink,
    UW: FrameSink,
{
    loop {
        let frame = match client_rx.next_frame().await {
            None => {
                let _ = err_tx.send(RelayError::ClientClosed).await;
                return;
            }
            Some(Err(e)) => {
                let _ = err_tx.send(e).await;
                return;
            }
            Some(Ok(frame)) => frame,
        };
        heartbeat.lock().record_client_activity(Instant::now());

        match frame {
            // Control traffic is terminated here, not forwarded upstream.
            Frame::Ping(payload) => {
                let mut tx = client_tx.lock().await;
                if let Err(e) = tx.send_frame(Frame::Pong(payload)).await {
                    let _ = err_tx.send(e).await;
                    return;
                }
            }
            Frame::Pong(_) => heartbeat.lock().record_pong(Instant::now()),
            Frame::Close => {
                let _ = err_tx.send(RelayError::ClientClosed).await;
                return;
            }
            frame @ (Frame::Text(_) | Frame::Binary(_)) => {
                if log_messages {
                    log_data_frame("->", &frame);
                }
                let mut tx = upstream_tx.lock().await;
                if let Err(e) = tx.send_frame(frame).await {
                    let _ = err_tx.send(e).await;
                    return;
                }
            }
        }
    }
}

/// Upstream → client pump.
async fn pump_upstream<UR, CW>(
    mut upstream_rx: UR,
    client_tx: Arc<Mutex<CW>>,
    err_tx: mpsc::Sender<RelayError>,
    log_messages: bool,
) where
    UR: FrameStream,
    CW: FrameSink,
{
    loop {
        let frame = match upstream_rx.next_frame().await {
            None => {
                let _ = err_tx.send(RelayError::UpstreamClosed).await;
                return;
            }
            Some(Err(e)) => {
                let _ = err_tx.send(e).await;
                return;
            }
            Some(Ok(frame)) => frame,
        };
        match frame {
            Frame::Close => {
                let _ = err_tx.send(RelayError::UpstreamClosed).await;
                return;
            }
            // Upstream control frames are the transport's own business.
            Frame::Ping(_) | Frame::Pong(_) => {}
            frame @ (Frame::Text(_) | Frame::Binary(_)) => {
                if log_messages {
                    log_data_frame("<-", &frame);
                }
                let mut tx = client_tx.lock().await;
                if let Err(e) = tx.send_frame(frame).await {
                    let _ = err_tx.send(e).await;
                    return;
                }
            }
        }
    }
}

/// Periodic liveness probe against the client.
async fn heartbeat_loop<CW>(
    client_tx: Arc<Mutex<CW>>,
    heartbeat: Arc<parking_lot::Mutex<HeartbeatState>>,
    err_tx: mpsc::Sender<RelayError>,
    config: HeartbeatConfig,
    cancel: CancellationToken,
) where
    CW: FrameSink,
{
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick of `interval` fires immediately; skip it so a fresh
    // session is never probed at time zero.
    let _ = ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }
        let action = heartbeat.lock().on_tick(Instant::now(), &config);
        match action {
            HeartbeatAction::Idle => {}
            HeartbeatAction::SendPing => {
                let mut tx = client_tx.lock().await;
                match tx.send_frame(Frame::Ping(bytes::Bytes::new())).await {
                    Ok(()) => heartbeat.lock().record_ping_sent(Instant::now()),
                    Err(e) => {
                        let _ = err_tx.send(e).await;
                        return;
                    }
                }
            }
            HeartbeatAction::DeclareDead => {
                let _ = err_tx.send(RelayError::HeartbeatTimeout).await;
                return;
            }
        }
    }
}

/// Log one relayed protocol message with its direction.
///
/// Only text frames carry the JSON command traffic worth logging; extraction
/// is best-effort and never affects forwarding.
fn log_data_frame(direction: &str, frame: &Frame) {
    let Frame::Text(text) = frame else { return };
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    info!(
        dir = direction,
        method = value.get("method").and_then(|v| v.as_str()).unwrap_or(""),
        id = value.get("id").and_then(serde_json::Value::as_u64),
        session_id = value.get("sessionId").and_then(|v| v.as_str()).unwrap_or(""),
        target_id = value.get("targetId").and_then(|v| v.as_str()).unwrap_or(""),
        frame_id = value.get("frameId").and_then(|v| v.as_str()).unwrap_or(""),
        raw_length = text.len(),
        "cdp"
    );
}
