//! Configuration for the beam streaming server.

use std::path::Path;

use serde::{Deserialize, Serialize};

use beam_core::session::MAX_FPS;
use beam_core::{AudioFormat, CaptureRegion, EncoderSettings, Result, SessionConfig, Tuning};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Network settings.
    pub network: NetworkConfig,
    /// Screen capture settings.
    pub capture: CaptureConfig,
    /// Video encoder settings.
    pub video: VideoConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address the WebSocket endpoint binds to.
    pub listen: String,
}

/// Screen capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Frame source: "x11" or "test-pattern".
    pub backend: String,
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Draw the pointer into captured frames.
    pub show_cursor: bool,
    /// X display name. If empty, `$DISPLAY` is used.
    pub display: String,
}

/// Video encoder configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    /// Encoder: "h264" (needs the `h264` feature) or "zstd". zstd is
    /// lossless and ignores bitrate and tuning.
    pub backend: String,
    /// Target bitrate in bits per second.
    pub bitrate: u32,
    /// Keyframe interval in frames.
    pub gop_size: u32,
    pub max_b_frames: u32,
    pub preset: String,
    pub profile: String,
    pub tune: String,
}

/// Audio capture configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Audio source: "device" (needs the `cpal` feature) or "silence".
    pub backend: String,
    /// Capture device name. If empty, the default input is used; name
    /// the output's monitor to stream desktop audio.
    pub device: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames_per_chunk: u32,
    /// Device buffer size hint in bytes.
    pub fragment_size: u32,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8090".into(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            backend: "x11".into(),
            x: 0,
            y: 0,
            width: 1920,
            height: 1080,
            fps: 60,
            show_cursor: true,
            display: String::new(),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        let settings = EncoderSettings::new(0, 0);
        Self {
            backend: "h264".into(),
            bitrate: settings.bitrate,
            gop_size: settings.gop_size,
            max_b_frames: settings.max_b_frames,
            preset: settings.tuning.preset,
            profile: settings.tuning.profile,
            tune: settings.tuning.tune,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        let format = AudioFormat::default();
        Self {
            backend: "device".into(),
            device: String::new(),
            sample_rate: format.sample_rate,
            channels: format.channels,
            frames_per_chunk: format.frames_per_chunk,
            fragment_size: format.fragment_size,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            file: String::new(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// X display to open, `None` for `$DISPLAY`.
    pub fn display(&self) -> Option<&str> {
        Some(self.capture.display.as_str()).filter(|d| !d.is_empty())
    }

    /// Audio device to open, `None` for the default input.
    pub fn audio_device(&self) -> Option<&str> {
        Some(self.audio.device.as_str()).filter(|d| !d.is_empty())
    }

    /// Build a validated session configuration.
    ///
    /// The frame rate is clamped to `1..=240` and odd region dimensions
    /// are rounded down to even, as 4:2:0 chroma requires.
    pub fn to_session_config(&self) -> Result<SessionConfig> {
        let capture = &self.capture;
        let region = CaptureRegion::new(capture.x, capture.y, capture.width & !1, capture.height & !1);
        let fps = capture.fps.clamp(1, MAX_FPS);

        let config = SessionConfig {
            region,
            fps,
            show_cursor: capture.show_cursor,
            encoder: EncoderSettings {
                width: region.width,
                height: region.height,
                bitrate: self.video.bitrate,
                framerate: fps,
                gop_size: self.video.gop_size,
                max_b_frames: self.video.max_b_frames,
                tuning: Tuning {
                    preset: self.video.preset.clone(),
                    profile: self.video.profile.clone(),
                    tune: self.video.tune.clone(),
                    low_delay: true,
                },
            },
            audio: AudioFormat {
                sample_rate: self.audio.sample_rate,
                channels: self.audio.channels,
                frames_per_chunk: self.audio.frames_per_chunk,
                fragment_size: self.audio.fragment_size,
            },
        };
        config.validate()?;
        Ok(config)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let cfg = ServerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        assert!(text.contains("listen"));
        assert!(text.contains("fps"));
        assert!(text.contains("zerolatency"));
    }

    #[test]
    fn roundtrip_config() {
        let cfg = ServerConfig::default();
        let text = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ServerConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.network.listen, "0.0.0.0:8090");
        assert_eq!(parsed.capture.fps, 60);
        assert_eq!(parsed.audio.frames_per_chunk, 960);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ServerConfig = toml::from_str("[capture]\nbackend = \"test-pattern\"\n").unwrap();
        assert_eq!(parsed.capture.backend, "test-pattern");
        assert_eq!(parsed.capture.width, 1920);
        assert_eq!(parsed.video.gop_size, 120);
    }

    #[test]
    fn default_session_config_is_low_latency() {
        let session = ServerConfig::default().to_session_config().unwrap();
        assert_eq!(session.region, CaptureRegion::new(0, 0, 1920, 1080));
        assert_eq!(session.encoder.bitrate, 6_000_000);
        assert_eq!(session.encoder.max_b_frames, 0);
        assert_eq!(session.audio.chunk_bytes(), 3840);
    }

    #[test]
    fn to_session_config_clamps() {
        let mut cfg = ServerConfig::default();
        cfg.capture.fps = 1000;
        cfg.capture.width = 641;
        cfg.capture.height = 481;
        let session = cfg.to_session_config().unwrap();
        assert_eq!(session.fps, 240);
        assert_eq!(session.encoder.framerate, 240);
        assert_eq!((session.region.width, session.region.height), (640, 480));
    }

    #[test]
    fn empty_region_is_rejected() {
        let mut cfg = ServerConfig::default();
        cfg.capture.width = 1;
        assert!(cfg.to_session_config().is_err());
    }

    #[test]
    fn defaults_select_h264_and_device_audio() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.video.backend, "h264");
        assert_eq!(cfg.video.profile, "baseline");
        assert_eq!(cfg.audio.backend, "device");
        assert_eq!(cfg.audio_device(), None);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ServerConfig::load(Path::new("/nonexistent/beam.toml"));
        assert_eq!(cfg.capture.backend, "x11");
    }
}
