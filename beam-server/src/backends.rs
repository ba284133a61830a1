//! Opens session collaborators according to the server configuration.

use tracing::info;

use beam_core::{
    AudioFormat, AudioSource, BeamError, Bt601Converter, CaptureRegion, Converter, CursorSource,
    EncoderSettings, FrameSource, MediaBackend, Result, SilenceSource, StaticCursor,
    TestPatternSource, VideoEncoder, ZstdEncoder,
};

use crate::config::ServerConfig;

/// Frame and cursor sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    X11,
    TestPattern,
}

/// Video encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoBackend {
    Zstd,
    H264,
}

/// Audio sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    Device,
    Silence,
}

impl std::str::FromStr for CaptureBackend {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "x11" => Ok(Self::X11),
            "test-pattern" => Ok(Self::TestPattern),
            other => Err(BeamError::InvalidConfig(format!("unknown capture backend {other:?}"))),
        }
    }
}

impl std::str::FromStr for VideoBackend {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "zstd" => Ok(Self::Zstd),
            "h264" => Ok(Self::H264),
            other => Err(BeamError::InvalidConfig(format!("unknown video backend {other:?}"))),
        }
    }
}

impl std::str::FromStr for AudioBackend {
    type Err = BeamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "device" => Ok(Self::Device),
            "silence" => Ok(Self::Silence),
            other => Err(BeamError::InvalidConfig(format!("unknown audio backend {other:?}"))),
        }
    }
}

// ── ServerBackend ────────────────────────────────────────────────

/// [`MediaBackend`] built from [`ServerConfig`]. Backend names are
/// parsed up front so a typo fails at startup, not at the first viewer.
#[derive(Debug, Clone)]
pub struct ServerBackend {
    capture: CaptureBackend,
    video: VideoBackend,
    audio: AudioBackend,
    display: Option<String>,
    audio_device: Option<String>,
}

impl ServerBackend {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let backend = Self {
            capture: config.capture.backend.parse()?,
            video: config.video.backend.parse()?,
            audio: config.audio.backend.parse()?,
            display: config.display().map(str::to_owned),
            audio_device: config.audio_device().map(str::to_owned),
        };

        if backend.capture == CaptureBackend::X11 && !cfg!(feature = "x11") {
            return Err(BeamError::InvalidConfig("built without the x11 feature".into()));
        }
        if backend.video == VideoBackend::H264 && !cfg!(feature = "h264") {
            return Err(BeamError::InvalidConfig("built without the h264 feature".into()));
        }
        if backend.audio == AudioBackend::Device && !cfg!(feature = "cpal") {
            return Err(BeamError::InvalidConfig("built without the cpal feature".into()));
        }

        info!(
            capture = ?backend.capture,
            video = ?backend.video,
            audio = ?backend.audio,
            "media backend selected"
        );
        Ok(backend)
    }
}

impl MediaBackend for ServerBackend {
    fn open_frame_source(&self, region: CaptureRegion) -> Result<Box<dyn FrameSource>> {
        match self.capture {
            CaptureBackend::X11 => x11::frame_source(self.display.as_deref(), region),
            CaptureBackend::TestPattern => Ok(Box::new(TestPatternSource::new())),
        }
    }

    fn open_cursor_source(&self) -> Result<Box<dyn CursorSource>> {
        match self.capture {
            CaptureBackend::X11 => x11::cursor_source(self.display.as_deref()),
            CaptureBackend::TestPattern => Ok(Box::new(StaticCursor::arrow((32, 32)))),
        }
    }

    fn open_converter(&self) -> Result<Box<dyn Converter>> {
        Ok(Box::new(Bt601Converter))
    }

    fn open_encoder(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        match self.video {
            VideoBackend::Zstd => Ok(Box::new(ZstdEncoder::new(settings.clone())?)),
            VideoBackend::H264 => h264::encoder(settings),
        }
    }

    fn open_audio(&self, format: &AudioFormat) -> Result<Box<dyn AudioSource>> {
        match self.audio {
            AudioBackend::Device => device::audio_source(self.audio_device.as_deref(), format),
            AudioBackend::Silence => Ok(Box::new(SilenceSource::new(format))),
        }
    }
}

#[cfg(feature = "x11")]
mod x11 {
    use beam_core::{
        BeamError, CaptureRegion, CursorSource, FrameSource, Result, X11CursorSource,
        X11FrameSource,
    };

    use super::region_fits;

    pub fn frame_source(display: Option<&str>, region: CaptureRegion) -> Result<Box<dyn FrameSource>> {
        let source = X11FrameSource::open(display)?;
        let (width, height) = source.screen_size();
        let fits = region_fits(region, (width, height));
        if !fits {
            return Err(BeamError::InvalidConfig(format!(
                "capture region {}x{}+{}+{} exceeds the {width}x{height} screen",
                region.width, region.height, region.x, region.y
            )));
        }
        Ok(Box::new(source))
    }

    pub fn cursor_source(display: Option<&str>) -> Result<Box<dyn CursorSource>> {
        Ok(Box::new(X11CursorSource::open(display)?))
    }
}

/// Whether `region` lies entirely on a `screen`-sized display.
#[cfg(any(feature = "x11", test))]
fn region_fits(region: CaptureRegion, screen: (u32, u32)) -> bool {
    let span = |origin: i32, len: u32, limit: u32| {
        u32::try_from(origin)
            .ok()
            .and_then(|o| o.checked_add(len))
            .is_some_and(|end| end <= limit)
    };
    span(region.x, region.width, screen.0) && span(region.y, region.height, screen.1)
}

#[cfg(not(feature = "x11"))]
mod x11 {
    use beam_core::{BeamError, CaptureRegion, CursorSource, FrameSource, Result};

    pub fn frame_source(_display: Option<&str>, _region: CaptureRegion) -> Result<Box<dyn FrameSource>> {
        Err(BeamError::Capture("built without the x11 feature".into()))
    }

    pub fn cursor_source(_display: Option<&str>) -> Result<Box<dyn CursorSource>> {
        Err(BeamError::Cursor("built without the x11 feature".into()))
    }
}

#[cfg(feature = "h264")]
mod h264 {
    use beam_core::{EncoderSettings, H264Encoder, Result, VideoEncoder};

    pub fn encoder(settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(H264Encoder::new(settings.clone())?))
    }
}

#[cfg(not(feature = "h264"))]
mod h264 {
    use beam_core::{BeamError, EncoderSettings, Result, VideoEncoder};

    pub fn encoder(_settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>> {
        Err(BeamError::EncoderConfig("built without the h264 feature".into()))
    }
}

#[cfg(feature = "cpal")]
mod device {
    use beam_core::{AudioFormat, AudioSource, DeviceAudioSource, Result};

    pub fn audio_source(device: Option<&str>, format: &AudioFormat) -> Result<Box<dyn AudioSource>> {
        Ok(Box::new(DeviceAudioSource::open(device, format)?))
    }
}

#[cfg(not(feature = "cpal"))]
mod device {
    use beam_core::{AudioFormat, AudioSource, BeamError, Result};

    pub fn audio_source(_device: Option<&str>, _format: &AudioFormat) -> Result<Box<dyn AudioSource>> {
        Err(BeamError::AudioOpen("built without the cpal feature".into()))
    }
}
