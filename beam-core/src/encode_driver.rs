//! Feeds frames to the encoder and forwards every drained packet.

use tracing::trace;

use crate::encoder::{Drain, VideoEncoder};
use crate::error::Result;
use crate::frame::PlanarFrame;
use crate::transport::{TransportMessage, TransportWriter};

/// Owns the encoder, the session's planar buffer and the timestamp
/// counter.
///
/// Timestamps start at 0 and increase by one per submitted frame.
pub struct EncodeDriver {
    encoder: Box<dyn VideoEncoder>,
    frame: PlanarFrame,
    next_pts: u64,
    packets: u64,
    bytes: u64,
}

impl EncodeDriver {
    pub fn new(encoder: Box<dyn VideoEncoder>, width: u32, height: u32) -> Self {
        Self {
            encoder,
            frame: PlanarFrame::new(width, height),
            next_pts: 0,
            packets: 0,
            bytes: 0,
        }
    }

    /// The planar buffer the converter writes into before
    /// [`submit`](Self::submit).
    pub fn frame_mut(&mut self) -> &mut PlanarFrame {
        &mut self.frame
    }

    /// Submit the current planar frame and forward everything the
    /// encoder has ready, tagged as video.
    ///
    /// Returns the number of packets written; zero is normal while the
    /// encoder buffers. Any encoder or write error is returned as is,
    /// and the frame's timestamp is spent either way.
    pub fn submit(&mut self, writer: &TransportWriter) -> Result<usize> {
        let pts = self.next_pts;
        self.next_pts += 1;
        self.encoder.submit_frame(&self.frame, pts)?;

        let mut forwarded = 0;
        loop {
            match self.encoder.drain_packet()? {
                Drain::Packet(packet) => {
                    writer.write(TransportMessage::video(&packet))?;
                    self.bytes += packet.len() as u64;
                    forwarded += 1;
                }
                Drain::Pending | Drain::Ended => break,
            }
        }

        self.packets += forwarded as u64;
        trace!(pts, forwarded, "frame submitted");
        Ok(forwarded)
    }

    /// Timestamp the next submitted frame will carry.
    pub fn next_pts(&self) -> u64 {
        self.next_pts
    }

    pub fn packets_sent(&self) -> u64 {
        self.packets
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes
    }

    pub fn encoder_name(&self) -> &'static str {
        self.encoder.name()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;
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

    struct ClosedSink;

    impl MessageSink for ClosedSink {
        fn send_binary(&mut self, _frame: Vec<u8>) -> Result<()> {
            Err(BeamError::Transport("viewer gone".into()))
        }
    }

    /// Emits a scripted number of packets per submitted frame.
    struct ScriptedEncoder {
        per_frame: VecDeque<usize>,
        pending: VecDeque<Vec<u8>>,
        seen_pts: Arc<Mutex<Vec<u64>>>,
        end_after: Option<usize>,
        fail_submit: bool,
        fail_drain: bool,
    }

    impl ScriptedEncoder {
        fn new(per_frame: &[usize]) -> Self {
            Self {
                per_frame: per_frame.iter().copied().collect(),
                pending: VecDeque::new(),
                seen_pts: Arc::default(),
                end_after: None,
                fail_submit: false,
                fail_drain: false,
            }
        }
    }

    impl VideoEncoder for ScriptedEncoder {
        fn submit_frame(&mut self, _frame: &PlanarFrame, pts: u64) -> Result<()> {
            self.seen_pts.lock().unwrap().push(pts);
            if self.fail_submit {
                return Err(BeamError::EncoderSubmit("rejected".into()));
            }
            let n = self.per_frame.pop_front().unwrap_or(1);
            for i in 0..n {
                self.pending.push_back(vec![pts as u8, i as u8]);
            }
            Ok(())
        }

        fn drain_packet(&mut self) -> Result<Drain> {
            if self.fail_drain {
                return Err(BeamError::EncoderDrain("broken".into()));
            }
            if self.end_after == Some(0) {
                return Ok(Drain::Ended);
            }
            if let Some(n) = self.end_after.as_mut() {
                *n -= 1;
            }
            Ok(self.pending.pop_front().map_or(Drain::Pending, Drain::Packet))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    #[test]
    fn timestamps_increase_and_packets_are_tagged() {
        let encoder = ScriptedEncoder::new(&[0, 2, 1]);
        let seen = encoder.seen_pts.clone();
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());
        let mut driver = EncodeDriver::new(Box::new(encoder), 4, 4);

        assert_eq!(driver.submit(&writer).unwrap(), 0);
        assert_eq!(driver.submit(&writer).unwrap(), 2);
        assert_eq!(driver.submit(&writer).unwrap(), 1);

        assert_eq!(*seen.lock().unwrap(), [0, 1, 2]);
        assert_eq!(driver.next_pts(), 3);
        assert_eq!(driver.packets_sent(), 3);

        let frames = sink.0.lock().unwrap();
        let decoded: Vec<_> = frames
            .iter()
            .map(|f| TransportMessage::decode(f).unwrap())
            .collect();
        assert!(decoded.iter().all(|(tag, _)| *tag == StreamTag::Video));
        assert_eq!(decoded[0].1, &[1, 0]);
        assert_eq!(decoded[1].1, &[1, 1]);
        assert_eq!(decoded[2].1, &[2, 0]);
    }

    #[test]
    fn ended_stops_the_drain() {
        let mut encoder = ScriptedEncoder::new(&[3]);
        encoder.end_after = Some(1);
        let writer = TransportWriter::new(VecSink::default());
        let mut driver = EncodeDriver::new(Box::new(encoder), 4, 4);

        assert_eq!(driver.submit(&writer).unwrap(), 1);
    }

    #[test]
    fn drain_failure_is_returned() {
        let mut encoder = ScriptedEncoder::new(&[1]);
        encoder.fail_drain = true;
        let writer = TransportWriter::new(VecSink::default());
        let mut driver = EncodeDriver::new(Box::new(encoder), 4, 4);

        let err = driver.submit(&writer).unwrap_err();
        assert!(matches!(err, BeamError::EncoderDrain(_)));
        assert_eq!(writer.messages_written(), 0);
    }

    #[test]
    fn submit_failure_is_returned_without_retry() {
        let mut encoder = ScriptedEncoder::new(&[1, 1]);
        encoder.fail_submit = true;
        let seen = encoder.seen_pts.clone();
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());
        let mut driver = EncodeDriver::new(Box::new(encoder), 4, 4);

        let err = driver.submit(&writer).unwrap_err();
        assert!(matches!(err, BeamError::EncoderSubmit(_)));
        assert!(sink.0.lock().unwrap().is_empty());
        assert_eq!(writer.messages_written(), 0);

        // one attempt per frame, and the next frame gets a fresh timestamp
        assert_eq!(*seen.lock().unwrap(), [0]);
        assert_eq!(driver.next_pts(), 1);
        driver.submit(&writer).unwrap_err();
        assert_eq!(*seen.lock().unwrap(), [0, 1]);
    }

    #[test]
    fn failed_write_is_not_counted() {
        let writer = TransportWriter::new(ClosedSink);
        let mut driver = EncodeDriver::new(Box::new(ScriptedEncoder::new(&[2])), 4, 4);

        let err = driver.submit(&writer).unwrap_err();
        assert!(matches!(err, BeamError::Transport(_)));
        assert_eq!(driver.packets_sent(), 0);
        assert_eq!(driver.bytes_sent(), 0);
    }
}
