//! Video encoder seam and its implementations.
//!
//! An encoder is stateful: frames go in one at a time through
//! [`VideoEncoder::submit_frame`], packets come out through
//! [`VideoEncoder::drain_packet`]. A submitted frame may yield zero,
//! one or several packets, possibly later. Encoders release their
//! native state on `Drop`.
//!
//! | Module       | Encoder                                  |
//! |--------------|------------------------------------------|
//! | `zstd_codec` | keyframe + XOR-delta planes, zstd packed |
//! | `h264`       | OpenH264 baseline (feature `h264`)       |

#[cfg(feature = "h264")]
pub mod h264;
pub mod zstd_codec;

#[cfg(feature = "h264")]
pub use h264::H264Encoder;
pub use zstd_codec::{PacketFlags, ZstdDecoder, ZstdEncoder, ZstdPacketHeader};

use crate::error::{BeamError, Result};
use crate::frame::PlanarFrame;

// ── Drain ────────────────────────────────────────────────────────

/// Result of polling an encoder for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drain {
    /// A compressed packet.
    Packet(Vec<u8>),
    /// Nothing available until more input is submitted.
    Pending,
    /// The encoder has been flushed and will produce nothing more.
    Ended,
}

// ── VideoEncoder ─────────────────────────────────────────────────

/// Feed/drain contract of a video compression engine.
pub trait VideoEncoder: Send {
    /// Submit one planar frame with presentation timestamp `pts`.
    fn submit_frame(&mut self, frame: &PlanarFrame, pts: u64) -> Result<()>;

    /// Take the next available packet, if any.
    fn drain_packet(&mut self) -> Result<Drain>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

// ── EncoderSettings ──────────────────────────────────────────────

/// Speed/latency tuning passed through to the encoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub preset: String,
    pub profile: String,
    pub tune: String,
    pub low_delay: bool,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            preset: "ultrafast".into(),
            profile: "baseline".into(),
            tune: "zerolatency".into(),
            low_delay: true,
        }
    }
}

/// Encoder configuration, fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width: u32,
    pub height: u32,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    pub framerate: u32,
    /// Keyframe interval in frames.
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub tuning: Tuning,
}

impl EncoderSettings {
    /// Low-latency defaults: 6 Mbps, 60 fps, GOP 120, no B-frames.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bitrate: 6_000_000,
            framerate: 60,
            gop_size: 120,
            max_b_frames: 0,
            tuning: Tuning::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(BeamError::EncoderConfig(format!(
                "{}x{} is not a valid 4:2:0 frame size",
                self.width, self.height
            )));
        }
        if self.framerate == 0 {
            return Err(BeamError::EncoderConfig("framerate must be non-zero".into()));
        }
        if self.gop_size == 0 {
            return Err(BeamError::EncoderConfig("gop size must be non-zero".into()));
        }
        Ok(())
    }
}
