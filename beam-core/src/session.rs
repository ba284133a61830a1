//! Session lifecycle: open collaborators, run both pipelines on named
//! threads, tear everything down once.
//!
//! ```text
//!  Initializing ──► Running ──► ShuttingDown ──► Terminated
//! ```
//!
//! A session is entered by [`Session::initialize`], which opens every
//! collaborator through a [`MediaBackend`]. [`Session::start`] moves the
//! pipelines onto their threads and returns a [`RunningSession`] handle.
//! Dropping the handle (or calling [`RunningSession::wait`]) is the single
//! release point: threads are joined, collaborators dropped, and the
//! transport closed.

use std::thread::{self, JoinHandle};
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::audio::{AudioFormat, AudioSource};
use crate::capture::{CursorSource, FrameSource};
use crate::convert::Converter;
use crate::encoder::{EncoderSettings, VideoEncoder};
use crate::error::{BeamError, Result};
use crate::frame::CaptureRegion;
use crate::pipeline::{AudioPipeline, PipelineExit, PipelineStats, VideoPipeline};
use crate::transport::TransportWriter;

pub const VIDEO_THREAD: &str = "beam-video";
pub const AUDIO_THREAD: &str = "beam-audio";

/// Highest accepted capture rate.
pub const MAX_FPS: u32 = 240;

// ── SessionPhase ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// Collaborators are being opened. Initial state.
    #[default]
    Initializing,

    /// Both pipeline threads have been spawned.
    Running {
        since: Instant,
    },

    /// Stop requested or both pipelines exited; threads being joined.
    ShuttingDown,

    /// Everything released. Terminal state.
    Terminated,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Running { .. } => write!(f, "Running"),
            Self::ShuttingDown => write!(f, "ShuttingDown"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}

impl SessionPhase {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    /// How long the session has been running. `None` in other phases.
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        match self {
            Self::Running { since } => Some(since.elapsed()),
            _ => None,
        }
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Initializing`.
    pub fn begin_running(&mut self) -> Result<()> {
        match self {
            Self::Initializing => {
                *self = Self::Running {
                    since: Instant::now(),
                };
                Ok(())
            }
            _ => Err(BeamError::InvalidTransition(
                "cannot run: not in Initializing state",
            )),
        }
    }

    /// Valid from: `Running`.
    pub fn begin_shutdown(&mut self) -> Result<()> {
        match self {
            Self::Running { .. } => {
                *self = Self::ShuttingDown;
                Ok(())
            }
            _ => Err(BeamError::InvalidTransition(
                "cannot shut down: not in Running state",
            )),
        }
    }

    /// Valid from: `ShuttingDown`.
    pub fn terminate(&mut self) -> Result<()> {
        match self {
            Self::ShuttingDown => {
                *self = Self::Terminated;
                Ok(())
            }
            _ => Err(BeamError::InvalidTransition(
                "cannot terminate: not in ShuttingDown state",
            )),
        }
    }
}

// ── SessionConfig ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub region: CaptureRegion,
    pub fps: u32,
    /// Open a cursor source and overlay the pointer on every frame.
    pub show_cursor: bool,
    pub encoder: EncoderSettings,
    pub audio: AudioFormat,
}

impl SessionConfig {
    /// Defaults for capturing `region`: 60 fps, cursor shown, encoder at
    /// the region's resolution, 48 kHz stereo audio.
    pub fn new(region: CaptureRegion) -> Self {
        Self {
            region,
            fps: 60,
            show_cursor: true,
            encoder: EncoderSettings::new(region.width, region.height),
            audio: AudioFormat::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.region.validate()?;
        if self.fps == 0 || self.fps > MAX_FPS {
            return Err(BeamError::InvalidConfig(format!(
                "fps {} outside 1..={MAX_FPS}",
                self.fps
            )));
        }
        if (self.encoder.width, self.encoder.height) != (self.region.width, self.region.height) {
            return Err(BeamError::InvalidConfig(format!(
                "encoder resolution {}x{} differs from capture region {}x{}",
                self.encoder.width, self.encoder.height, self.region.width, self.region.height
            )));
        }
        self.encoder.validate()?;
        self.audio.validate()
    }
}

// ── MediaBackend ─────────────────────────────────────────────────

/// Opens the collaborators of one session.
///
/// Each call hands over ownership; the session drops what it received
/// exactly once, at teardown or when initialisation fails part-way.
pub trait MediaBackend {
    fn open_frame_source(&self, region: CaptureRegion) -> Result<Box<dyn FrameSource>>;
    fn open_cursor_source(&self) -> Result<Box<dyn CursorSource>>;
    fn open_converter(&self) -> Result<Box<dyn Converter>>;
    fn open_encoder(&self, settings: &EncoderSettings) -> Result<Box<dyn VideoEncoder>>;
    fn open_audio(&self, format: &AudioFormat) -> Result<Box<dyn AudioSource>>;
}

// ── Session ──────────────────────────────────────────────────────

/// A fully initialised session that has not started yet.
pub struct Session {
    phase: SessionPhase,
    config: SessionConfig,
    video: VideoPipeline,
    audio: AudioPipeline,
}

impl Session {
    /// Validate `config` and open every collaborator.
    ///
    /// Any failure aborts the session; whatever was already opened is
    /// dropped on return.
    pub fn initialize(config: SessionConfig, backend: &dyn MediaBackend) -> Result<Self> {
        config.validate()?;

        let source = backend.open_frame_source(config.region)?;
        let cursor = if config.show_cursor {
            Some(backend.open_cursor_source()?)
        } else {
            None
        };
        let converter = backend.open_converter()?;
        let encoder = backend.open_encoder(&config.encoder)?;
        let audio_source = backend.open_audio(&config.audio)?;

        info!(
            x = config.region.x,
            y = config.region.y,
            width = config.region.width,
            height = config.region.height,
            fps = config.fps,
            encoder = encoder.name(),
            sample_rate = config.audio.sample_rate,
            channels = config.audio.channels,
            "session initialized"
        );

        Ok(Self {
            phase: SessionPhase::Initializing,
            video: VideoPipeline::new(source, cursor, converter, encoder, config.region, config.fps),
            audio: AudioPipeline::new(audio_source, &config.audio),
            config,
        })
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Spawn both pipeline threads.
    ///
    /// `cancel` is the session's stop signal; cancelling it (or any
    /// parent token) makes both pipelines exit after their current
    /// iteration.
    pub fn start(self, writer: TransportWriter, cancel: CancellationToken) -> Result<RunningSession> {
        let Self {
            mut phase,
            video,
            audio,
            ..
        } = self;
        phase.begin_running()?;

        let mut running = RunningSession {
            phase,
            cancel,
            writer,
            video: None,
            audio: None,
        };

        running.video = Some(spawn_pipeline(VIDEO_THREAD, &running.writer, &running.cancel, move |w, c| {
            video.run(w, c)
        })?);
        running.audio = Some(spawn_pipeline(AUDIO_THREAD, &running.writer, &running.cancel, move |w, c| {
            audio.run(w, c)
        })?);

        info!("session running");
        Ok(running)
    }
}

fn spawn_pipeline<F>(
    name: &'static str,
    writer: &TransportWriter,
    cancel: &CancellationToken,
    run: F,
) -> Result<JoinHandle<PipelineExit>>
where
    F: FnOnce(&TransportWriter, &CancellationToken) -> PipelineExit + Send + 'static,
{
    let writer = writer.clone();
    let cancel = cancel.clone();
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || run(&writer, &cancel))
        .map_err(|source| BeamError::Spawn { name, source })
}

// ── RunningSession ───────────────────────────────────────────────

/// Outcome of both pipelines.
#[derive(Debug)]
pub struct SessionReport {
    pub video: PipelineExit,
    pub audio: PipelineExit,
}

impl SessionReport {
    pub fn is_clean(&self) -> bool {
        self.video.is_clean() && self.audio.is_clean()
    }
}

/// Handle to a started session. Dropping it tears the session down.
pub struct RunningSession {
    phase: SessionPhase,
    cancel: CancellationToken,
    writer: TransportWriter,
    video: Option<JoinHandle<PipelineExit>>,
    audio: Option<JoinHandle<PipelineExit>>,
}

impl RunningSession {
    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Ask both pipelines to stop after their current iteration.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// `true` once both pipeline threads have exited.
    pub fn is_finished(&self) -> bool {
        [&self.video, &self.audio]
            .into_iter()
            .all(|h| h.as_ref().is_none_or(|h| h.is_finished()))
    }

    /// Block until the session is stopped or both pipelines have exited,
    /// then release everything.
    pub fn wait(mut self) -> SessionReport {
        self.teardown()
    }

    /// [`stop`](Self::stop) then [`wait`](Self::wait).
    pub fn shutdown(self) -> SessionReport {
        self.stop();
        self.wait()
    }

    fn teardown(&mut self) -> SessionReport {
        let video = join_pipeline(VIDEO_THREAD, self.video.take());
        let audio = join_pipeline(AUDIO_THREAD, self.audio.take());

        if self.phase.begin_shutdown().is_ok() {
            let reason = if self.cancel.is_cancelled() {
                "stop requested"
            } else {
                "both pipelines exited"
            };
            info!(reason, "session shutting down");
        }

        if !self.phase.is_terminated() {
            if let Err(e) = self.writer.close() {
                debug!("transport close failed: {e}");
            }
            // ShuttingDown is the only phase left at this point
            let _ = self.phase.terminate();
            info!(
                messages = self.writer.messages_written(),
                bytes = self.writer.bytes_written(),
                "session terminated"
            );
        }

        SessionReport { video, audio }
    }
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        if !self.phase.is_terminated() {
            self.cancel.cancel();
            self.teardown();
        }
    }
}

fn join_pipeline(name: &'static str, handle: Option<JoinHandle<PipelineExit>>) -> PipelineExit {
    match handle.map(JoinHandle::join) {
        Some(Ok(exit)) => exit,
        Some(Err(_)) => {
            warn!(thread = name, "pipeline thread panicked");
            PipelineExit {
                stats: PipelineStats::default(),
                error: Some(BeamError::Panicked(name)),
            }
        }
        None => PipelineExit {
            stats: PipelineStats::default(),
            error: None,
        },
    }
}
