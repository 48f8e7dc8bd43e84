//! Discovery of the browser's current DevTools endpoint.
//!
//! The browser process is restarted by a supervisor whenever it crashes or is
//! deliberately recycled, and each restart announces a brand-new debugging URL
//! in the supervisor log. This crate keeps track of whichever URL is current:
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `registry` | Single current endpoint address, concurrent get/set/wait |
//! | `watcher` | Log tailer that scans for announcement lines and publishes |
//!
//! The registry is the only state shared with the proxy crates; everything
//! else here is internal to the tailing loop.

pub mod error;
pub mod registry;
pub mod watcher;

pub use error::UpstreamError;
pub use registry::EndpointRegistry;
pub use watcher::EndpointWatcher;
