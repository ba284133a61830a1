//! Lossless planar encoder built on zstd.
//!
//! Every `gop_size`-th frame is a keyframe carrying the packed Y, U and V
//! planes. Frames in between carry the XOR of the packed planes against
//! the previous frame, which is mostly zero bytes on a static desktop
//! and compresses to almost nothing.
//!
//! ## Packet layout
//!
//! ```text
//! flags:   u8   (bit 0 = keyframe)
//! pts:     u64  (LE)
//! width:   u32  (LE)
//! height:  u32  (LE)
//! data:    [u8] (zstd frame)
//! ```
//!
//! One packet is produced per submitted frame.

use std::collections::VecDeque;

use bitflags::bitflags;
use bytes::{Buf, BufMut};
use tracing::debug;

use super::{Drain, EncoderSettings, VideoEncoder};
use crate::error::{BeamError, Result};
use crate::frame::PlanarFrame;

bitflags! {
    /// Per-packet flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PacketFlags: u8 {
        const KEYFRAME = 0b0000_0001;
    }
}

// ── ZstdPacketHeader ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZstdPacketHeader {
    pub flags: PacketFlags,
    pub pts: u64,
    pub width: u32,
    pub height: u32,
}

impl ZstdPacketHeader {
    /// Encoded size on the wire.
    pub const SIZE: usize = 17;

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.put_u8(self.flags.bits());
        out.put_u64_le(self.pts);
        out.put_u32_le(self.width);
        out.put_u32_le(self.height);
    }

    /// Split a packet into its header and compressed body.
    pub fn decode(mut packet: &[u8]) -> Result<(Self, &[u8])> {
        if packet.len() < Self::SIZE {
            return Err(BeamError::InvalidMessage("zstd packet shorter than header"));
        }
        let header = Self {
            flags: PacketFlags::from_bits_truncate(packet.get_u8()),
            pts: packet.get_u64_le(),
            width: packet.get_u32_le(),
            height: packet.get_u32_le(),
        };
        Ok((header, packet))
    }

    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }
}

// ── ZstdEncoder ──────────────────────────────────────────────────

pub struct ZstdEncoder {
    settings: EncoderSettings,
    compressor: zstd::bulk::Compressor<'static>,
    previous: Vec<u8>,
    current: Vec<u8>,
    delta: Vec<u8>,
    frames_since_key: u32,
    pending: VecDeque<Vec<u8>>,
}

impl ZstdEncoder {
    pub fn new(settings: EncoderSettings) -> Result<Self> {
        settings.validate()?;
        let level = level_for_preset(&settings.tuning.preset);
        let compressor = zstd::bulk::Compressor::new(level)
            .map_err(|e| BeamError::EncoderConfig(format!("zstd level {level}: {e}")))?;

        debug!(
            width = settings.width,
            height = settings.height,
            gop = settings.gop_size,
            level,
            "zstd encoder configured"
        );

        Ok(Self {
            settings,
            compressor,
            previous: Vec::new(),
            current: Vec::new(),
            delta: Vec::new(),
            frames_since_key: 0,
            pending: VecDeque::new(),
        })
    }
}

impl VideoEncoder for ZstdEncoder {
    fn submit_frame(&mut self, frame: &PlanarFrame, pts: u64) -> Result<()> {
        if frame.width() != self.settings.width || frame.height() != self.settings.height {
            return Err(BeamError::EncoderSubmit(format!(
                "frame {}x{} does not match encoder {}x{}",
                frame.width(),
                frame.height(),
                self.settings.width,
                self.settings.height
            )));
        }

        self.current.clear();
        frame.write_packed(&mut self.current);

        let keyframe = self.frames_since_key == 0;
        let compressed = if keyframe {
            self.compressor.compress(&self.current)
        } else {
            self.delta.clear();
            self.delta.extend(
                self.current
                    .iter()
                    .zip(&self.previous)
                    .map(|(cur, prev)| cur ^ prev),
            );
            self.compressor.compress(&self.delta)
        };
        let body =
            compressed.map_err(|e| BeamError::EncoderSubmit(format!("zstd compress: {e}")))?;

        let header = ZstdPacketHeader {
            flags: if keyframe { PacketFlags::KEYFRAME } else { PacketFlags::empty() },
            pts,
            width: self.settings.width,
            height: self.settings.height,
        };
        let mut packet = Vec::with_capacity(ZstdPacketHeader::SIZE + body.len());
        header.encode(&mut packet);
        packet.extend_from_slice(&body);
        self.pending.push_back(packet);

        std::mem::swap(&mut self.previous, &mut self.current);
        self.frames_since_key = (self.frames_since_key + 1) % self.settings.gop_size;
        Ok(())
    }

    fn drain_packet(&mut self) -> Result<Drain> {
        Ok(self.pending.pop_front().map_or(Drain::Pending, Drain::Packet))
    }

    fn name(&self) -> &'static str {
        "zstd"
    }
}

fn level_for_preset(preset: &str) -> i32 {
    match preset {
        "ultrafast" | "superfast" | "veryfast" => 1,
        "faster" | "fast" => 3,
        "medium" => 6,
        "slow" | "slower" => 12,
        "veryslow" => 19,
        _ => 1,
    }
}

// ── ZstdDecoder ──────────────────────────────────────────────────

/// Inverse of [`ZstdEncoder`], reconstructing packed I420 planes.
#[derive(Debug, Default)]
pub struct ZstdDecoder {
    frame: Vec<u8>,
}

impl ZstdDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one packet and return the packed planes of the frame.
    ///
    /// A delta packet before any keyframe is an error.
    pub fn decode(&mut self, packet: &[u8]) -> Result<(ZstdPacketHeader, &[u8])> {
        let (header, body) = ZstdPacketHeader::decode(packet)?;
        let (w, h) = (header.width as usize, header.height as usize);
        let len = w * h + 2 * (w / 2) * (h / 2);

        let data = zstd::bulk::decompress(body, len)
            .map_err(|e| BeamError::Other(format!("zstd decompress: {e}")))?;
        if data.len() != len {
            return Err(BeamError::InvalidMessage("decoded frame has wrong size"));
        }

        if header.is_keyframe() {
            self.frame = data;
        } else {
            if self.frame.len() != len {
                return Err(BeamError::InvalidMessage("delta packet without keyframe"));
            }
            for (out, d) in self.frame.iter_mut().zip(&data) {
                *out ^= d;
            }
        }
        Ok((header, self.frame.as_slice()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(gop: u32) -> EncoderSettings {
        let mut s = EncoderSettings::new(16, 8);
        s.gop_size = gop;
        s
    }

    fn frame_with_luma(value: u8) -> PlanarFrame {
        let mut frame = PlanarFrame::new(16, 8);
        let (y, _, _, _) = frame.planes_mut();
        y.fill(value);
        frame
    }

    fn drain_all(enc: &mut ZstdEncoder) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while let Drain::Packet(p) = enc.drain_packet().unwrap() {
            out.push(p);
        }
        out
    }

    #[test]
    fn empty_encoder_drains_pending() {
        let mut enc = ZstdEncoder::new(settings(4)).unwrap();
        assert_eq!(enc.drain_packet().unwrap(), Drain::Pending);
    }

    #[test]
    fn keyframes_follow_gop_cadence() {
        let mut enc = ZstdEncoder::new(settings(3)).unwrap();
        let frame = frame_with_luma(50);
        let mut keys = Vec::new();
        for pts in 0..7 {
            enc.submit_frame(&frame, pts).unwrap();
            for packet in drain_all(&mut enc) {
                let (header, _) = ZstdPacketHeader::decode(&packet).unwrap();
                assert_eq!(header.pts, pts);
                keys.push(header.is_keyframe());
            }
        }
        assert_eq!(keys, [true, false, false, true, false, false, true]);
    }

    #[test]
    fn decoder_reconstructs_frames() {
        let mut enc = ZstdEncoder::new(settings(10)).unwrap();
        let mut dec = ZstdDecoder::new();

        for (pts, luma) in [(0u64, 16u8), (1, 80), (2, 80), (3, 200)] {
            let frame = frame_with_luma(luma);
            enc.submit_frame(&frame, pts).unwrap();
            let packets = drain_all(&mut enc);
            assert_eq!(packets.len(), 1);

            let (header, planes) = dec.decode(&packets[0]).unwrap();
            assert_eq!(header.pts, pts);
            let mut expected = Vec::new();
            frame.write_packed(&mut expected);
            assert_eq!(planes, expected.as_slice());
        }
    }

    #[test]
    fn static_delta_frames_are_small() {
        let mut enc = ZstdEncoder::new(EncoderSettings::new(256, 256)).unwrap();
        let frame = PlanarFrame::new(256, 256);
        enc.submit_frame(&frame, 0).unwrap();
        enc.submit_frame(&frame, 1).unwrap();
        let packets = drain_all(&mut enc);
        assert!(packets[1].len() < 256, "delta packet is {} bytes", packets[1].len());
    }

    #[test]
    fn mismatched_frame_is_rejected() {
        let mut enc = ZstdEncoder::new(settings(4)).unwrap();
        let err = enc.submit_frame(&PlanarFrame::new(8, 8), 0).unwrap_err();
        assert!(matches!(err, BeamError::EncoderSubmit(_)));
    }

    #[test]
    fn delta_before_keyframe_is_rejected() {
        let mut enc = ZstdEncoder::new(settings(4)).unwrap();
        let frame = frame_with_luma(1);
        enc.submit_frame(&frame, 0).unwrap();
        enc.submit_frame(&frame, 1).unwrap();
        let packets = drain_all(&mut enc);

        let mut dec = ZstdDecoder::new();
        assert!(dec.decode(&packets[1]).is_err());
    }
}
