//! H.264 encoding through OpenH264.
//!
//! Requires the `h264` feature. Produces one Annex-B access unit per
//! submitted frame (SPS/PPS are included on keyframes), which browsers'
//! `VideoDecoder` accept as `avc1.42E01E` baseline.

use std::collections::VecDeque;

use openh264::OpenH264API;
use openh264::encoder::{
    BitRate, Complexity, Encoder, EncoderConfig, FrameRate, Profile, RateControlMode, UsageType,
};
use openh264::formats::YUVSlices;
use tracing::{debug, info};

use super::{Drain, EncoderSettings, Tuning, VideoEncoder};
use crate::error::{BeamError, Result};
use crate::frame::PlanarFrame;

pub struct H264Encoder {
    encoder: Encoder,
    settings: EncoderSettings,
    frames_since_key: u32,
    pending: VecDeque<Vec<u8>>,
}

impl H264Encoder {
    pub fn new(settings: EncoderSettings) -> Result<Self> {
        settings.validate()?;
        let tuning = &settings.tuning;

        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(settings.bitrate))
            .max_frame_rate(FrameRate::from_hz(settings.framerate as f32))
            .rate_control_mode(RateControlMode::Bitrate)
            .profile(profile_for(&tuning.profile)?)
            .complexity(complexity_for(&tuning.preset))
            .usage_type(UsageType::ScreenContentRealTime)
            .skip_frames(!drops_no_frames(tuning));

        let api = OpenH264API::from_source();
        let encoder = Encoder::with_api_config(api, config)
            .map_err(|e| BeamError::EncoderConfig(format!("openh264: {e}")))?;

        if settings.max_b_frames != 0 {
            debug!("openh264 baseline never emits B-frames; ignoring max_b_frames");
        }
        info!(
            width = settings.width,
            height = settings.height,
            bitrate = settings.bitrate,
            framerate = settings.framerate,
            gop = settings.gop_size,
            profile = %tuning.profile,
            preset = %tuning.preset,
            tune = %tuning.tune,
            "h264 encoder created"
        );

        Ok(Self {
            encoder,
            settings,
            frames_since_key: 0,
            pending: VecDeque::new(),
        })
    }
}

impl VideoEncoder for H264Encoder {
    fn submit_frame(&mut self, frame: &PlanarFrame, pts: u64) -> Result<()> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        if frame.width() != self.settings.width || frame.height() != self.settings.height {
            return Err(BeamError::EncoderSubmit(format!(
                "frame {w}x{h} does not match encoder {}x{}",
                self.settings.width, self.settings.height
            )));
        }

        if self.frames_since_key == 0 {
            self.encoder.force_intra_frame();
        }
        self.frames_since_key = (self.frames_since_key + 1) % self.settings.gop_size;

        let [ys, us, vs] = frame.strides();
        let yuv = YUVSlices::new((frame.plane(0), frame.plane(1), frame.plane(2)), (w, h), (ys, us, vs));
        let bitstream = self
            .encoder
            .encode(&yuv)
            .map_err(|e| BeamError::EncoderSubmit(format!("openh264 encode: {e}")))?;

        let packet = bitstream.to_vec();
        if !packet.is_empty() {
            tracing::trace!(pts, bytes = packet.len(), "encoded access unit");
            self.pending.push_back(packet);
        }
        Ok(())
    }

    fn drain_packet(&mut self) -> Result<Drain> {
        Ok(self.pending.pop_front().map_or(Drain::Pending, Drain::Packet))
    }

    fn name(&self) -> &'static str {
        "h264"
    }
}

/// Only profiles OpenH264 can emit are accepted.
fn profile_for(name: &str) -> Result<Profile> {
    match name {
        "baseline" | "constrained-baseline" => Ok(Profile::Baseline),
        "main" => Ok(Profile::Main),
        "high" => Ok(Profile::High),
        other => Err(BeamError::EncoderConfig(format!("unsupported h264 profile {other:?}"))),
    }
}

fn complexity_for(preset: &str) -> Complexity {
    match preset {
        "ultrafast" | "superfast" | "veryfast" | "faster" => Complexity::Low,
        "fast" | "medium" => Complexity::Medium,
        _ => Complexity::High,
    }
}

/// Low-delay and zero-latency tuning never skip frames to meet the
/// bitrate; the viewer decodes every access unit as it arrives.
fn drops_no_frames(tuning: &Tuning) -> bool {
    tuning.low_delay || tuning.tune == "zerolatency"
}
