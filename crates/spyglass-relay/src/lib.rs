//! WebSocket relay and discovery rewriter for the DevTools proxy.
//!
//! Automation clients connect to this proxy at a stable address; the real
//! browser endpoint is ephemeral and is resolved per request from the
//! [`spyglass_upstream::EndpointRegistry`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `frame` | Protocol-agnostic frame model + axum/tungstenite conversions |
//! | `conn` | {read, write, close} capability traits over split sockets |
//! | `heartbeat` | Inbound-peer liveness bookkeeping and tick decisions |
//! | `session` | Per-connection pump tasks, heartbeat task, run-once teardown |
//! | `handler` | WebSocket upgrade → upstream dial → session |
//! | `discovery` | `/json/version` and `/json[/list]` with address rewriting |
//! | `server` | Router assembly and listener lifecycle |
//! | `metrics` | Metric name constants and recorder install |
//!
//! ## Data flow
//!
//! `handler` reads the registry at accept time and pins the session to that
//! endpoint; `discovery` re-reads it per HTTP request. Neither ever writes it.

pub mod conn;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod handler;
pub mod heartbeat;
pub mod metrics;
pub mod server;
pub mod session;

pub use error::{DiscoveryError, RelayError};
pub use frame::Frame;
pub use heartbeat::HeartbeatConfig;
pub use session::SessionConfig;
pub use server::{ProxyConfig, ProxyState, ServerHandle, build_router, start};
