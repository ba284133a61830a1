//! The two producer loops of a session.
//!
//! Each pipeline owns its collaborators outright and runs on its own
//! thread until the session's token is cancelled or one of its stages
//! fails. A failure ends only the pipeline that observed it.

pub mod audio;
pub mod video;

pub use audio::AudioPipeline;
pub use video::VideoPipeline;

use tracing::{info, warn};

use crate::error::BeamError;

/// Counters reported when a pipeline exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Completed iterations (frames captured or chunks read).
    pub iterations: u64,
    /// Messages handed to the transport.
    pub messages: u64,
    /// Payload bytes handed to the transport, tags excluded.
    pub bytes: u64,
    /// Video iterations that missed their deadline. Always 0 for audio.
    pub overruns: u64,
}

/// How a pipeline ended.
#[derive(Debug)]
pub struct PipelineExit {
    pub stats: PipelineStats,
    /// `None` when the pipeline stopped because it was cancelled.
    pub error: Option<BeamError>,
}

impl PipelineExit {
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn log(&self, pipeline: &'static str) {
        let s = &self.stats;
        match &self.error {
            None => info!(
                pipeline,
                iterations = s.iterations,
                messages = s.messages,
                bytes = s.bytes,
                overruns = s.overruns,
                "pipeline stopped"
            ),
            Some(e) => warn!(
                pipeline,
                iterations = s.iterations,
                messages = s.messages,
                bytes = s.bytes,
                overruns = s.overruns,
                "pipeline failed: {e}"
            ),
        }
    }
}
