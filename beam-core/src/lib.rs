//! # beam-core
//!
//! Real-time screen and audio streaming engine.
//!
//! This crate contains:
//! - **Frames**: `FrameBuffer`, `PlanarFrame`, `CursorImage`, `CaptureRegion`
//! - **Capture**: `FrameSource` / `CursorSource` with X11 and test-pattern sources
//! - **Compositor**: alpha-blends the pointer into captured frames
//! - **Convert**: `Converter`, integer BT.601 RGB → I420
//! - **Encoder**: `VideoEncoder` with H.264 (feature `h264`, default) and zstd (always)
//! - **Pacer**: phase-locked `FramePacer` for the 60 Hz video loop
//! - **Audio**: `AudioSource` with sound-device (feature `cpal`), reader and silence sources
//! - **Transport**: tagged `TransportMessage` and the shared `TransportWriter`
//! - **Pipeline**: the video and audio producer loops
//! - **Session**: `SessionPhase` lifecycle and `MediaBackend` factory
//! - **Error**: `BeamError`, typed, `thiserror`-based error hierarchy

pub mod audio;
pub mod capture;
pub mod compositor;
pub mod convert;
pub mod encode_driver;
pub mod encoder;
pub mod error;
pub mod frame;
pub mod pacer;
pub mod pipeline;
pub mod session;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use audio::{AudioFormat, AudioSource, ChunkAssembler, IntoPcm16, ReaderAudioSource, SilenceSource};
pub use capture::{CursorSource, FrameSource, StaticCursor, TestPatternSource};
pub use compositor::composite_cursor;
pub use convert::{Bt601Converter, Converter};
pub use encode_driver::EncodeDriver;
pub use encoder::{Drain, EncoderSettings, Tuning, VideoEncoder, ZstdDecoder, ZstdEncoder};
pub use error::{BeamError, Result};
pub use frame::{CaptureRegion, CursorImage, FrameBuffer, PlanarFrame, RowOrder};
pub use pacer::{FramePacer, Pace, PacerStats, StageTimings};
pub use pipeline::{AudioPipeline, PipelineExit, PipelineStats, VideoPipeline};
pub use session::{MediaBackend, RunningSession, Session, SessionConfig, SessionPhase, SessionReport};
pub use transport::{MessageSink, StreamTag, TransportMessage, TransportWriter};

#[cfg(feature = "cpal")]
pub use audio::DeviceAudioSource;
#[cfg(feature = "h264")]
pub use encoder::H264Encoder;
#[cfg(feature = "x11")]
pub use capture::{X11CursorSource, X11FrameSource};

/// Re-exported so callers can build session tokens without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
