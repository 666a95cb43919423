use std::fmt::Display;
use thiserror::Error;

/// Error messages Chrome emits when a frame or its execution context goes away
/// underneath an in-flight call.
const FRAME_LIFECYCLE_MARKERS: &[&str] = &[
    "Frame was detached",
    "Frame has been detached",
    "Frame with the given id was not found",
    "Frame with the given frameId is not found",
    "No frame for given id found",
    "No frame with given id found",
    "Execution context was destroyed",
    "Cannot find context with specified id",
    "No node with given id found",
    "Could not find node with given id",
];

const TIMEOUT_MARKERS: &[&str] = &["timed out", "Timeout", "timeout", "never came"];

/// Errors that can occur while driving the browser or extracting an observation
#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    LaunchFailed(String),

    #[error("Failed to connect to browser: {0}")]
    ConnectionFailed(String),

    #[error("Tab operation failed: {0}")]
    TabOperationFailed(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    /// A frame was detached, navigated, or lost its execution context mid-call
    #[error("Frame lifecycle race: {0}")]
    FrameLifecycle(String),

    /// A child frame's owner element carries no usable bid after its parent was marked
    #[error("Cannot mark child frame '{frame_id}' without a bid")]
    MissingFrameBid { frame_id: String },

    #[error("CDP call {method} timed out: {reason}")]
    Timeout { method: String, reason: String },

    #[error("CDP call {method} failed: {reason}")]
    CdpCallFailed { method: String, reason: String },

    #[error("Script evaluation failed in frame '{frame_id}': {reason}")]
    ScriptFailed { frame_id: String, reason: String },

    #[error("Malformed DOM snapshot: {0}")]
    MalformedSnapshot(String),

    /// A CDP payload did not have the expected shape
    #[error("Unexpected protocol payload: {0}")]
    Protocol(String),

    #[error("Screenshot failed: {0}")]
    ScreenshotFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Extraction failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<BrowserError>,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    /// Classify a raw CDP failure by its message
    pub fn from_cdp(method: &str, err: impl Display) -> Self {
        let reason = err.to_string();
        if is_frame_lifecycle_message(&reason) {
            BrowserError::FrameLifecycle(format!("{}: {}", method, reason))
        } else if TIMEOUT_MARKERS.iter().any(|m| reason.contains(m)) {
            BrowserError::Timeout { method: method.to_string(), reason }
        } else {
            BrowserError::CdpCallFailed { method: method.to_string(), reason }
        }
    }

    /// Classify an exception thrown by an injected script
    pub fn from_script(frame_id: &str, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if is_frame_lifecycle_message(&reason) {
            BrowserError::FrameLifecycle(format!("frame '{}': {}", frame_id, reason))
        } else {
            BrowserError::ScriptFailed { frame_id: frame_id.to_string(), reason }
        }
    }

    /// Whether a fresh extraction cycle may succeed where this one failed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BrowserError::FrameLifecycle(_) | BrowserError::MissingFrameBid { .. } | BrowserError::Timeout { .. }
        )
    }

    pub fn is_frame_lifecycle(&self) -> bool {
        matches!(self, BrowserError::FrameLifecycle(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, BrowserError::Timeout { .. })
    }
}

fn is_frame_lifecycle_message(message: &str) -> bool {
    FRAME_LIFECYCLE_MARKERS.iter().any(|m| message.contains(m))
}

/// Result type alias for browser operations
pub type Result<T> = std::result::Result<T, BrowserError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cdp_classifies_detached_frames() {
        let err = BrowserError::from_cdp("Accessibility.getFullAXTree", "Frame with the given frameId is not found.");
        assert!(err.is_frame_lifecycle());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_cdp_classifies_timeouts() {
        let err = BrowserError::from_cdp("DOMSnapshot.captureSnapshot", "The event waited for never came");
        assert!(err.is_timeout());
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_from_cdp_other_errors_are_fatal() {
        let err = BrowserError::from_cdp("DOM.describeNode", "Invalid parameters");
        assert!(matches!(err, BrowserError::CdpCallFailed { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_from_script_detects_destroyed_context() {
        let err = BrowserError::from_script("F1", "Execution context was destroyed, most likely because of a navigation.");
        assert!(err.is_frame_lifecycle());

        let err = BrowserError::from_script("F1", "TypeError: x is undefined");
        assert!(matches!(err, BrowserError::ScriptFailed { .. }));
    }

    #[test]
    fn test_missing_frame_bid_is_recoverable() {
        let err = BrowserError::MissingFrameBid { frame_id: "F2".to_string() };
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("F2"));
    }

    #[test]
    fn test_retries_exhausted_keeps_source() {
        let err = BrowserError::RetriesExhausted {
            attempts: 4,
            source: Box::new(BrowserError::FrameLifecycle("gone".to_string())),
        };
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("4 attempts"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
