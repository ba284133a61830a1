//! Domain-specific error types for the beam pipeline.
//!
//! All fallible operations return `Result<T, BeamError>`.
//! Which pipeline an error is fatal to is decided by the caller; the
//! error itself only says what went wrong.

use thiserror::Error;

/// The canonical error type for the capture / encode / transport pipeline.
#[derive(Debug, Error)]
pub enum BeamError {
    // ── Capture Errors ───────────────────────────────────────────
    /// The frame source could not deliver the requested region.
    #[error("capture error: {0}")]
    Capture(String),

    /// The cursor source failed (distinct from "no cursor visible").
    #[error("cursor query error: {0}")]
    Cursor(String),

    /// A captured image did not match the session's fixed dimensions.
    #[error("frame size mismatch: expected {expected_width}x{expected_height}, got {width}x{height}")]
    FrameSizeMismatch {
        expected_width: u32,
        expected_height: u32,
        width: u32,
        height: u32,
    },

    /// The display delivered a pixel layout this crate cannot read.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    // ── Encoder Errors ───────────────────────────────────────────
    /// Encoder construction or configuration failed.
    #[error("encoder configuration failed: {0}")]
    EncoderConfig(String),

    /// Submitting a frame to the encoder failed.
    #[error("encoder submit failed: {0}")]
    EncoderSubmit(String),

    /// Draining a packet from the encoder failed.
    #[error("encoder drain failed: {0}")]
    EncoderDrain(String),

    // ── Audio Errors ─────────────────────────────────────────────
    /// The audio device could not be opened.
    #[error("audio open failed: {0}")]
    AudioOpen(String),

    /// A blocking chunk read failed or the source ended.
    #[error("audio read failed: {0}")]
    AudioRead(String),

    // ── Transport Errors ─────────────────────────────────────────
    /// Writing a message to the viewer connection failed.
    #[error("transport write failed: {0}")]
    Transport(String),

    /// A transport message could not be parsed.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    /// A tag byte did not map to any known stream.
    #[error("unknown stream tag: {0:#04x}")]
    UnknownTag(u8),

    // ── Session Errors ───────────────────────────────────────────
    /// A session phase transition was attempted from the wrong phase.
    #[error("invalid session transition: {0}")]
    InvalidTransition(&'static str),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A pipeline thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// A pipeline thread panicked.
    #[error("{0} pipeline panicked")]
    Panicked(&'static str),

    // ── I/O ──────────────────────────────────────────────────────
    /// Underlying I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for BeamError {
    fn from(s: String) -> Self {
        BeamError::Other(s)
    }
}

impl From<&str> for BeamError {
    fn from(s: &str) -> Self {
        BeamError::Other(s.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BeamError>;
