//! Audio sources delivering fixed-size PCM chunks by blocking read.
//!
//! The default source captures a sound device through `cpal` (feature
//! `cpal`); on PulseAudio or PipeWire hosts, pointing it at the output's
//! monitor device streams what the desktop is playing.

#[cfg(feature = "cpal")]
mod device;

use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::error::{BeamError, Result};

#[cfg(feature = "cpal")]
pub use device::DeviceAudioSource;

// ── AudioFormat ──────────────────────────────────────────────────

/// Interleaved signed 16-bit little-endian PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
    /// Frames (samples per channel) in one chunk.
    pub frames_per_chunk: u32,
    /// Device fragment size hint in bytes.
    pub fragment_size: u32,
}

impl Default for AudioFormat {
    /// 48 kHz stereo, 960-frame (20 ms) chunks.
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 2,
            frames_per_chunk: 960,
            fragment_size: 960,
        }
    }
}

impl AudioFormat {
    pub const BYTES_PER_SAMPLE: usize = 2;

    /// Size of one chunk in bytes.
    pub fn chunk_bytes(&self) -> usize {
        self.frames_per_chunk as usize * self.channels as usize * Self::BYTES_PER_SAMPLE
    }

    /// Wall-clock duration of one chunk.
    pub fn chunk_duration(&self) -> Duration {
        Duration::from_secs(self.frames_per_chunk as u64) / self.sample_rate.max(1)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.channels == 0 || self.frames_per_chunk == 0 {
            return Err(BeamError::InvalidConfig(format!(
                "audio format {} Hz / {} ch / {} frames is empty",
                self.sample_rate, self.channels, self.frames_per_chunk
            )));
        }
        Ok(())
    }
}

// ── AudioSource ──────────────────────────────────────────────────

/// Blocking source of PCM chunks. Closed on `Drop`.
pub trait AudioSource: Send {
    /// Fill `buf` completely, blocking until enough audio is captured.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()>;
}

// ── ReaderAudioSource ────────────────────────────────────────────

/// Reads chunks from any byte stream (pipe, FIFO, file).
///
/// End of stream is a read failure.
pub struct ReaderAudioSource<R> {
    reader: R,
}

impl<R: Read + Send> ReaderAudioSource<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

}

impl<R: Read + Send> AudioSource for ReaderAudioSource<R> {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        self.reader.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => BeamError::AudioRead("audio stream ended".into()),
            _ => BeamError::AudioRead(e.to_string()),
        })
    }
}

// ── ChunkAssembler ───────────────────────────────────────────────

/// Packs device callback buffers of any length into fixed-size S16LE
/// chunks.
///
/// Samples arrive interleaved in whatever block size the device picks;
/// a chunk is emitted each time `chunk_bytes` bytes have accumulated.
#[derive(Debug)]
pub struct ChunkAssembler {
    chunk_bytes: usize,
    partial: Vec<u8>,
}

impl ChunkAssembler {
    pub fn new(format: &AudioFormat) -> Self {
        let chunk_bytes = format.chunk_bytes();
        Self {
            chunk_bytes,
            partial: Vec::with_capacity(chunk_bytes),
        }
    }

    /// Append samples, handing every completed chunk to `emit`.
    pub fn push<S, F>(&mut self, samples: &[S], mut emit: F)
    where
        S: Copy + IntoPcm16,
        F: FnMut(Vec<u8>),
    {
        for &sample in samples {
            self.partial.extend_from_slice(&sample.into_pcm16().to_le_bytes());
            if self.partial.len() == self.chunk_bytes {
                let chunk = std::mem::replace(&mut self.partial, Vec::with_capacity(self.chunk_bytes));
                emit(chunk);
            }
        }
    }

    /// Bytes buffered toward the next chunk.
    pub fn buffered(&self) -> usize {
        self.partial.len()
    }
}

/// Device sample formats convertible to signed 16-bit PCM.
pub trait IntoPcm16 {
    fn into_pcm16(self) -> i16;
}

impl IntoPcm16 for i16 {
    fn into_pcm16(self) -> i16 {
        self
    }
}

impl IntoPcm16 for u16 {
    fn into_pcm16(self) -> i16 {
        (self as i32 - 32_768) as i16
    }
}

impl IntoPcm16 for f32 {
    fn into_pcm16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
    }
}

// ── SilenceSource ────────────────────────────────────────────────

/// Produces zeroed chunks at real-time rate, for machines without a
/// sound server.
pub struct SilenceSource {
    chunk: Duration,
    next: Option<Instant>,
}

impl SilenceSource {
    pub fn new(format: &AudioFormat) -> Self {
        Self {
            chunk: format.chunk_duration(),
            next: None,
        }
    }
}

impl AudioSource for SilenceSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        let now = Instant::now();
        let due = *self.next.get_or_insert(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next = Some(due.max(now) + self.chunk);
        buf.fill(0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_chunk_is_twenty_milliseconds() {
        let format = AudioFormat::default();
        assert_eq!(format.chunk_bytes(), 3840);
        assert_eq!(format.chunk_duration(), Duration::from_millis(20));
    }

    #[test]
    fn reader_source_delivers_whole_chunks_then_fails() {
        let data: Vec<u8> = (0..10u8).collect();
        let mut source = ReaderAudioSource::new(Cursor::new(data));
        let mut buf = [0u8; 4];

        source.read_chunk(&mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
        source.read_chunk(&mut buf).unwrap();
        assert_eq!(buf, [4, 5, 6, 7]);

        let err = source.read_chunk(&mut buf).unwrap_err();
        assert!(matches!(err, BeamError::AudioRead(_)));
    }

    #[test]
    fn assembler_emits_exact_chunks_across_callbacks() {
        let format = AudioFormat::default();
        let mut assembler = ChunkAssembler::new(&format);
        let mut chunks = Vec::new();

        // device blocks that do not line up with 960-frame chunks
        let block = vec![0x0102i16; 700];
        for _ in 0..6 {
            assembler.push(&block, |c| chunks.push(c));
        }

        // 4200 samples: two 1920-sample chunks, 360 samples left over
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 960 * 2 * 2));
        assert_eq!(&chunks[0][..2], &[0x02, 0x01]);
        assert_eq!(assembler.buffered(), 360 * 2);
    }

    #[test]
    fn float_and_unsigned_samples_become_s16() {
        assert_eq!(1.0f32.into_pcm16(), i16::MAX);
        assert_eq!((-2.0f32).into_pcm16(), -i16::MAX);
        assert_eq!(0.0f32.into_pcm16(), 0);
        assert_eq!(32_768u16.into_pcm16(), 0);
        assert_eq!(0u16.into_pcm16(), i16::MIN);
    }

    #[test]
    fn silence_is_paced() {
        let format = AudioFormat {
            frames_per_chunk: 48,
            ..AudioFormat::default()
        };
        let mut source = SilenceSource::new(&format);
        let mut buf = vec![1u8; format.chunk_bytes()];

        let start = Instant::now();
        for _ in 0..6 {
            source.read_chunk(&mut buf).unwrap();
        }
        assert!(buf.iter().all(|&b| b == 0));
        // first chunk is immediate, the next five wait 1ms each
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
