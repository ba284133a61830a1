//! Sound-device capture through `cpal`.
//!
//! `cpal` streams are not `Send` on every host, so the stream lives on a
//! dedicated `beam-audio-capture` thread. Its callback packs samples into
//! fixed-size chunks and queues them; [`DeviceAudioSource::read_chunk`]
//! blocks on that queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleFormat, SampleRate, SizedSample, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use tracing::{debug, info, trace, warn};

use super::{AudioFormat, AudioSource, ChunkAssembler, IntoPcm16};
use crate::error::{BeamError, Result};

/// Chunks buffered between the device callback and the audio pipeline.
const CHUNK_QUEUE: usize = 16;

/// A silent device still delivers zeroed chunks; nothing at all for this
/// long means the stream is dead.
const STALL_TIMEOUT: Duration = Duration::from_secs(2);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

type ChunkResult = Result<Vec<u8>>;

/// Captures an input device (or a sink monitor exposed as one).
pub struct DeviceAudioSource {
    chunks: Receiver<ChunkResult>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DeviceAudioSource {
    /// Open `device` by name, or the host's default input when `None`,
    /// and start capturing in `format`.
    ///
    /// Returns once the stream is playing, or with
    /// [`BeamError::AudioOpen`] if it cannot be started.
    pub fn open(device: Option<&str>, format: &AudioFormat) -> Result<Self> {
        format.validate()?;

        let (chunk_tx, chunk_rx) = bounded::<ChunkResult>(CHUNK_QUEUE);
        let (ready_tx, ready_rx) = bounded::<Result<String>>(1);
        let running = Arc::new(AtomicBool::new(true));

        let thread = thread::Builder::new()
            .name("beam-audio-capture".into())
            .spawn({
                let running = Arc::clone(&running);
                let device = device.map(str::to_owned);
                let format = *format;
                move || capture_thread(device.as_deref(), &format, chunk_tx, ready_tx, &running)
            })
            .map_err(|e| BeamError::AudioOpen(format!("capture thread: {e}")))?;

        let opened = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(BeamError::AudioOpen("capture thread exited".into())));
        match opened {
            Ok(name) => {
                info!(
                    device = %name,
                    sample_rate = format.sample_rate,
                    channels = format.channels,
                    "audio capture started"
                );
                Ok(Self {
                    chunks: chunk_rx,
                    running,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                if thread.join().is_err() {
                    warn!("audio capture thread panicked");
                }
                Err(e)
            }
        }
    }
}

impl AudioSource for DeviceAudioSource {
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<()> {
        match self.chunks.recv_timeout(STALL_TIMEOUT) {
            Ok(Ok(chunk)) if chunk.len() == buf.len() => {
                buf.copy_from_slice(&chunk);
                Ok(())
            }
            Ok(Ok(chunk)) => Err(BeamError::AudioRead(format!(
                "device chunk is {} bytes, expected {}",
                chunk.len(),
                buf.len()
            ))),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Err(BeamError::AudioRead(format!(
                "no audio from device for {STALL_TIMEOUT:?}"
            ))),
            Err(RecvTimeoutError::Disconnected) => {
                Err(BeamError::AudioRead("capture stream closed".into()))
            }
        }
    }
}

impl Drop for DeviceAudioSource {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("audio capture thread panicked");
            }
        }
        debug!("audio capture stopped");
    }
}

// ── Capture thread ───────────────────────────────────────────────

fn capture_thread(
    device: Option<&str>,
    format: &AudioFormat,
    chunks: Sender<ChunkResult>,
    ready: Sender<Result<String>>,
    running: &AtomicBool,
) {
    let stream = match open_stream(device, format, chunks) {
        Ok((stream, name)) => {
            let _ = ready.send(Ok(name));
            stream
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    while running.load(Ordering::Relaxed) {
        thread::sleep(POLL_INTERVAL);
    }
    drop(stream);
}

fn open_stream(
    name: Option<&str>,
    format: &AudioFormat,
    chunks: Sender<ChunkResult>,
) -> Result<(cpal::Stream, String)> {
    let host = cpal::default_host();
    let device = select_device(&host, name)?;
    let device_name = device.name().unwrap_or_else(|_| "unknown".into());
    let sample_format = device
        .default_input_config()
        .map_err(|e| BeamError::AudioOpen(format!("{device_name}: {e}")))?
        .sample_format();

    // fragment size is a byte hint; cpal wants frames
    let frame_bytes = format.channels as u32 * AudioFormat::BYTES_PER_SAMPLE as u32;
    let fragment_frames = format.fragment_size / frame_bytes;
    let mut config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: if fragment_frames > 0 {
            BufferSize::Fixed(fragment_frames)
        } else {
            BufferSize::Default
        },
    };

    let stream = match build_stream(&device, &config, sample_format, format, chunks.clone()) {
        Ok(stream) => stream,
        Err(e) if matches!(config.buffer_size, BufferSize::Fixed(_)) => {
            debug!("{device_name}: {fragment_frames}-frame buffer refused ({e}); using device default");
            config.buffer_size = BufferSize::Default;
            build_stream(&device, &config, sample_format, format, chunks)?
        }
        Err(e) => return Err(e),
    };
    stream
        .play()
        .map_err(|e| BeamError::AudioOpen(format!("{device_name}: {e}")))?;

    Ok((stream, device_name))
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device> {
    match name {
        None => host
            .default_input_device()
            .ok_or_else(|| BeamError::AudioOpen("no default input device".into())),
        Some(wanted) => host
            .input_devices()
            .map_err(|e| BeamError::AudioOpen(format!("listing input devices: {e}")))?
            .find(|d| d.name().is_ok_and(|n| n == wanted))
            .ok_or_else(|| BeamError::AudioOpen(format!("no input device named {wanted:?}"))),
    }
}

fn build_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    sample_format: SampleFormat,
    format: &AudioFormat,
    chunks: Sender<ChunkResult>,
) -> Result<cpal::Stream> {
    match sample_format {
        SampleFormat::I16 => build_typed::<i16>(device, config, format, chunks),
        SampleFormat::U16 => build_typed::<u16>(device, config, format, chunks),
        SampleFormat::F32 => build_typed::<f32>(device, config, format, chunks),
        other => Err(BeamError::AudioOpen(format!("unsupported sample format {other:?}"))),
    }
}

fn build_typed<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    format: &AudioFormat,
    chunks: Sender<ChunkResult>,
) -> Result<cpal::Stream>
where
    T: SizedSample + IntoPcm16,
{
    let mut assembler = ChunkAssembler::new(format);
    let errors = chunks.clone();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                assembler.push(data, |chunk| {
                    if let Err(TrySendError::Full(_)) = chunks.try_send(Ok(chunk)) {
                        trace!("audio queue full, chunk dropped");
                    }
                });
            },
            move |err| {
                let _ = errors.try_send(Err(BeamError::AudioRead(err.to_string())));
            },
            None,
        )
        .map_err(|e| BeamError::AudioOpen(e.to_string()))
}
