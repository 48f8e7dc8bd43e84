//! Catch-all WebSocket upgrade handler.
//!
//! Every inbound path upgrades into a relay session against whatever
//! endpoint is registered at that instant. The client's own path and query
//! are deliberately discarded: the upstream's current path encodes a
//! browser-session identifier that changes across restarts, so only the
//! registered address knows where the protocol actually lives.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::SinkExt;
use metrics::counter;
use tokio_tungstenite::connect_async_with_config;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{debug, error};
use url::Url;

use crate::conn::{split_client, split_upstream};
use crate::metrics::RELAY_DIAL_FAILURES_TOTAL;
use crate::server::ProxyState;
use crate::session::run_session;

/// Effectively no limit on relayed message size; screenshots and snapshots
/// can run to tens of megabytes.
pub const MAX_MESSAGE_BYTES: usize = 100 * 1024 * 1024;

/// Build the outbound dial target from a registered endpoint address.
///
/// Keeps scheme, host, path, and query; drops userinfo and fragment.
pub fn upstream_target(endpoint: &str) -> Result<Url, url::ParseError> {
    let mut target = Url::parse(endpoint)?;
    target.set_fragment(None);
    let _ = target.set_username("");
    let _ = target.set_password(None);
    Ok(target)
}

/// Upgrade the inbound connection and relay it to the current endpoint.
pub async fn relay_handler(State(state): State<ProxyState>, ws: WebSocketUpgrade) -> Response {
    let Some(endpoint) = state.registry.current() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "upstream not ready").into_response();
    };
    let target = match upstream_target(&endpoint) {
        Ok(target) => target,
        Err(e) => {
            error!(error = %e, endpoint, "registered endpoint is not a valid URL");
            return (StatusCode::INTERNAL_SERVER_ERROR, "invalid upstream").into_response();
        }
    };
    ws.max_message_size(MAX_MESSAGE_BYTES)
        .max_frame_size(MAX_MESSAGE_BYTES)
        .on_upgrade(move |socket| proxy_connection(socket, target, state))
}

/// Dial the upstream and run the relay session to completion.
async fn proxy_connection(socket: WebSocket, target: Url, state: ProxyState) {
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(MAX_MESSAGE_BYTES))
        .max_frame_size(Some(MAX_MESSAGE_BYTES));
    let upstream = match connect_async_with_config(target.as_str(), Some(ws_config), false).await {
        Ok((upstream, _response)) => upstream,
        Err(e) => {
            counter!(RELAY_DIAL_FAILURES_TOTAL).increment(1);
            error!(error = %e, url = %target, "dial upstream failed");
            let mut socket = socket;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    debug!(url = %target, "proxying devtools websocket");

    let (client_rx, client_tx) = split_client(socket);
    let (upstream_rx, upstream_tx) = split_upstream(upstream);
    let _ = run_session(
        client_rx,
        client_tx,
        upstream_rx,
        upstream_tx,
        state.session,
        state.cancel.clone(),
    )
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_keeps_scheme_host_path_query() {
        let target =
            upstream_target("ws://127.0.0.1:9223/devtools/browser/abc-123?probe=1").unwrap();
        assert_eq!(
            target.as_str(),
            "ws://127.0.0.1:9223/devtools/browser/abc-123?probe=1"
        );
    }

    #[test]
    fn target_drops_fragment_and_userinfo() {
        let target = upstream_target("ws://user:pw@10.0.0.5:9223/devtools/page/x#frag").unwrap();
        assert_eq!(target.as_str(), "ws://10.0.0.5:9223/devtools/page/x");
    }

    #[test]
    fn target_rejects_garbage() {
        assert!(upstream_target("not a url").is_err());
    }
}
