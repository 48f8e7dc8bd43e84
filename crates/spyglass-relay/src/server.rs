//! Router assembly and listener lifecycle.

use std::io;
use std::net::SocketAddr;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use spyglass_upstream::EndpointRegistry;

use crate::discovery;
use crate::handler;
use crate::session::SessionConfig;

/// Proxy server settings.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Listen address. Port 0 picks an ephemeral port.
    pub bind_addr: String,
    /// Relay session settings applied to every accepted connection.
    pub session: SessionConfig,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9222".to_owned(),
            session: SessionConfig::default(),
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ProxyState {
    /// Where the current browser endpoint is looked up.
    pub registry: EndpointRegistry,
    /// Client for discovery fetches against the browser's HTTP listener.
    pub http: reqwest::Client,
    /// Relay session settings.
    pub session: SessionConfig,
    /// Cancelled on shutdown; ends in-flight relay sessions.
    pub cancel: CancellationToken,
}

/// Handle to a running proxy server.
pub struct ServerHandle {
    /// The address actually bound.
    pub addr: SocketAddr,
    serve_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Wait for the server to finish draining after cancellation.
    pub async fn stopped(self) {
        let _ = self.serve_task.await;
    }
}

/// Assemble the proxy router.
///
/// Discovery paths are registered with and without a trailing slash; some
/// clients normalize one way, some the other. Everything else falls through
/// to the WebSocket relay.
pub fn build_router(state: ProxyState) -> Router {
    Router::new()
        .route("/json", get(discovery::targets))
        .route("/json/", get(discovery::targets))
        .route("/json/list", get(discovery::targets))
        .route("/json/list/", get(discovery::targets))
        .route("/json/version", get(discovery::version))
        .route("/json/version/", get(discovery::version))
        .fallback(handler::relay_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and start serving; returns once the listener is accepting.
///
/// Cancelling `cancel` stops accepting and ends in-flight sessions.
pub async fn start(
    config: ProxyConfig,
    registry: EndpointRegistry,
    cancel: CancellationToken,
) -> io::Result<ServerHandle> {
    let state = ProxyState {
        registry,
        http: reqwest::Client::new(),
        session: config.session,
        cancel: cancel.clone(),
    };
    let router = build_router(state);

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let addr = listener.local_addr()?;
    info!(%addr, "devtools proxy listening");

    let shutdown = cancel.clone();
    let serve_task = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "proxy server exited with error");
        }
    });

    Ok(ServerHandle { addr, serve_task })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn started(registry: EndpointRegistry) -> (ServerHandle, CancellationToken) {
        let cancel = CancellationToken::new();
        let config = ProxyConfig {
            bind_addr: "127.0.0.1:0".to_owned(),
            ..ProxyConfig::default()
        };
        let handle = start(config, registry, cancel.clone()).await.unwrap();
        (handle, cancel)
    }

    #[tokio::test]
    async fn version_unavailable_before_discovery() {
        let (handle, cancel) = started(EndpointRegistry::new()).await;
        let resp = reqwest::get(format!("http://{}/json/version", handle.addr))
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);
        cancel.cancel();
        handle.stopped().await;
    }

    #[tokio::test]
    async fn version_points_at_the_proxy() {
        let registry = EndpointRegistry::new();
        assert!(registry.set("ws://127.0.0.1:9223/devtools/browser/abc"));
        let (handle, cancel) = started(registry).await;

        for path in ["/json/version", "/json/version/"] {
            let resp = reqwest::get(format!("http://{}{path}", handle.addr))
                .await
                .unwrap();
            assert_eq!(resp.status(), 200);
            let body: serde_json::Value = resp.json().await.unwrap();
            assert_eq!(
                body["webSocketDebuggerUrl"],
                format!("ws://{}", handle.addr)
            );
        }
        cancel.cancel();
        handle.stopped().await;
    }

    #[tokio::test]
    async fn plain_http_on_relay_path_is_rejected() {
        let registry = EndpointRegistry::new();
        assert!(registry.set("ws://127.0.0.1:9223/devtools/browser/abc"));
        let (handle, cancel) = started(registry).await;

        // No upgrade headers; the relay fallback refuses it.
        let resp = reqwest::get(format!("http://{}/devtools/page/x", handle.addr))
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        cancel.cancel();
        handle.stopped().await;
    }

    #[tokio::test]
    async fn cancellation_stops_the_server() {
        let (handle, cancel) = started(EndpointRegistry::new()).await;
        cancel.cancel();
        handle.stopped().await;
    }
}
