//! Error taxonomy shared by the relay and the player.
//!
//! Every variant carries plain strings so the error is `Clone`: the relay
//! fans a single handshake result out to every caller waiting on it.

pub type Result<T> = std::result::Result<T, RadioError>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RadioError {
    /// An origin or relay leg answered with a non-success status, or could
    /// not be reached at all.
    #[error("{leg} failed: {detail}")]
    Upstream { leg: String, detail: String },

    /// A response arrived but a required field was missing or malformed.
    #[error("bad response: {0}")]
    BadResponse(String),

    /// The media playlist contained no playable variant.
    #[error("no stream variant found in playlist for {0}")]
    PlaylistNotFound(String),

    /// The host refused to start audio playback.
    #[error("playback rejected: {0}")]
    PlaybackRejected(String),

    /// The user declined capture or file-system access.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A requested station (or similar target) does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl RadioError {
    pub fn upstream(leg: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        Self::Upstream {
            leg: leg.into(),
            detail: detail.to_string(),
        }
    }

    pub fn bad_response(msg: impl Into<String>) -> Self {
        Self::BadResponse(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Upstream and bad-response failures share the same handling: the
    /// player shows a stopped state and does not retry on its own.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::BadResponse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message() {
        let err = RadioError::upstream("auth1", "HTTP 500");
        assert_eq!(err.to_string(), "auth1 failed: HTTP 500");
        assert!(err.is_transport());
        assert!(!RadioError::not_found("x").is_transport());
    }
}
