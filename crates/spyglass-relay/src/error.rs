//! Relay and discovery error types.

use thiserror::Error;

/// Why a relay session ended.
///
/// Everything here except [`RelayError::HeartbeatTimeout`] is an ordinary
/// disconnect and is logged at debug severity; a heartbeat timeout means the
/// peer vanished without a close handshake and is logged at warn so operators
/// can tell the two apart. Sessions never surface these to the client — the
/// connection is simply torn down.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The automation client closed or dropped its connection.
    #[error("client connection closed")]
    ClientClosed,

    /// The browser closed or dropped the upstream connection.
    #[error("upstream connection closed")]
    UpstreamClosed,

    /// Transport failure on the client leg.
    #[error("client transport error: {0}")]
    Client(String),

    /// Transport failure on the upstream leg.
    #[error("upstream transport error: {0}")]
    Upstream(String),

    /// The client never answered a liveness probe within the grace period.
    #[error("client ping timeout")]
    HeartbeatTimeout,
}

impl RelayError {
    /// Whether this end reason indicates an unresponsive peer rather than a
    /// clean or failed close.
    pub fn is_heartbeat_timeout(&self) -> bool {
        matches!(self, Self::HeartbeatTimeout)
    }
}

/// Errors from the target-discovery HTTP endpoints.
///
/// All variants map to `502 Bad Gateway` for the caller; the proximate cause
/// is logged for diagnostics.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The upstream discovery fetch failed at the transport level.
    #[error("failed to fetch target list from browser: {0}")]
    Fetch(String),

    /// The upstream answered with a non-success status.
    #[error("browser returned status {status}")]
    UpstreamStatus {
        /// The status code the browser returned.
        status: u16,
    },

    /// The upstream body did not decode as an array of target records.
    #[error("failed to parse target list: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_timeout_is_distinguished() {
        assert!(RelayError::HeartbeatTimeout.is_heartbeat_timeout());
        assert!(!RelayError::ClientClosed.is_heartbeat_timeout());
        assert!(!RelayError::Upstream("reset".into()).is_heartbeat_timeout());
    }

    #[test]
    fn relay_error_display() {
        assert_eq!(RelayError::ClientClosed.to_string(), "client connection closed");
        assert_eq!(
            RelayError::Upstream("connection reset".into()).to_string(),
            "upstream transport error: connection reset"
        );
        assert_eq!(RelayError::HeartbeatTimeout.to_string(), "client ping timeout");
    }

    #[test]
    fn discovery_error_display() {
        let err = DiscoveryError::UpstreamStatus { status: 500 };
        assert_eq!(err.to_string(), "browser returned status 500");
        assert!(
            DiscoveryError::Decode("expected array".into())
                .to_string()
                .contains("expected array")
        );
    }
}
