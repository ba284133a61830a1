//! Blocking chunk reads forwarded as audio messages.

use tokio_util::sync::CancellationToken;
use tracing::{info, trace};

use super::{PipelineExit, PipelineStats};
use crate::audio::{AudioFormat, AudioSource};
use crate::error::Result;
use crate::transport::{TransportMessage, TransportWriter};

pub struct AudioPipeline {
    source: Box<dyn AudioSource>,
    chunk: Vec<u8>,
}

impl AudioPipeline {
    pub fn new(source: Box<dyn AudioSource>, format: &AudioFormat) -> Self {
        Self {
            source,
            chunk: vec![0; format.chunk_bytes()],
        }
    }

    /// Read one chunk and write it tagged as audio.
    pub fn iterate(&mut self, writer: &TransportWriter) -> Result<()> {
        self.source.read_chunk(&mut self.chunk)?;
        writer.write(TransportMessage::audio(&self.chunk))
    }

    /// Loop until `cancel` fires or a read or write fails. The source's
    /// own blocking read sets the pace.
    pub fn run(mut self, writer: &TransportWriter, cancel: &CancellationToken) -> PipelineExit {
        info!(chunk_bytes = self.chunk.len(), "audio pipeline started");

        let mut stats = PipelineStats::default();
        let mut error = None;
        while !cancel.is_cancelled() {
            if let Err(e) = self.iterate(writer) {
                error = Some(e);
                break;
            }
            if stats.iterations == 0 {
                info!(bytes = self.chunk.len(), "first audio chunk");
            }
            stats.iterations += 1;
            stats.messages += 1;
            stats.bytes += self.chunk.len() as u64;
            trace!(chunk = stats.iterations, "audio chunk sent");
        }

        let exit = PipelineExit { stats, error };
        exit.log("audio");
        exit
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::audio::{ReaderAudioSource, SilenceSource};
    use crate::error::BeamError;
    use crate::transport::{MessageSink, StreamTag};

    #[derive(Default, Clone)]
    struct VecSink(Arc<Mutex<Vec<Vec<u8>>>>);

    impl MessageSink for VecSink {
        fn send_binary(&mut self, frame: Vec<u8>) -> Result<()> {
            self.0.lock().unwrap().push(frame);
            Ok(())
        }
    }

    fn tiny_format() -> AudioFormat {
        AudioFormat {
            frames_per_chunk: 2,
            ..AudioFormat::default()
        }
    }

    #[test]
    fn chunks_are_forwarded_until_the_stream_ends() {
        let format = tiny_format();
        let pcm: Vec<u8> = (0..24u8).collect();
        let source = ReaderAudioSource::new(Cursor::new(pcm));
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());

        let exit = AudioPipeline::new(Box::new(source), &format).run(&writer, &CancellationToken::new());

        assert!(matches!(exit.error, Some(BeamError::AudioRead(_))));
        assert_eq!(exit.stats.iterations, 3);
        assert_eq!(exit.stats.bytes, 24);

        let frames = sink.0.lock().unwrap();
        assert_eq!(frames.len(), 3);
        let (tag, payload) = TransportMessage::decode(&frames[1]).unwrap();
        assert_eq!(tag, StreamTag::Audio);
        assert_eq!(payload, &(8..16u8).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn cancelled_before_start_reads_nothing() {
        let format = tiny_format();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let writer = TransportWriter::new(VecSink::default());

        let exit = AudioPipeline::new(Box::new(SilenceSource::new(&format)), &format).run(&writer, &cancel);

        assert!(exit.is_clean());
        assert_eq!(exit.stats, PipelineStats::default());
        assert_eq!(writer.messages_written(), 0);
    }
}
