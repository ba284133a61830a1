//! Capture → cursor overlay → colour conversion → encode, paced.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{PipelineExit, PipelineStats};
use crate::capture::{CursorSource, FrameSource};
use crate::compositor::composite_cursor;
use crate::convert::Converter;
use crate::encode_driver::EncodeDriver;
use crate::encoder::VideoEncoder;
use crate::error::Result;
use crate::frame::{CaptureRegion, FrameBuffer};
use crate::pacer::{FramePacer, StageTimings};
use crate::transport::TransportWriter;

pub struct VideoPipeline {
    source: Box<dyn FrameSource>,
    cursor: Option<Box<dyn CursorSource>>,
    converter: Box<dyn Converter>,
    driver: EncodeDriver,
    frame: FrameBuffer,
    region: CaptureRegion,
    fps: u32,
}

impl VideoPipeline {
    /// Allocates the session's frame buffer and planar buffer, both sized
    /// to `region` for the pipeline's whole life.
    pub fn new(
        source: Box<dyn FrameSource>,
        cursor: Option<Box<dyn CursorSource>>,
        converter: Box<dyn Converter>,
        encoder: Box<dyn VideoEncoder>,
        region: CaptureRegion,
        fps: u32,
    ) -> Self {
        Self {
            source,
            cursor,
            converter,
            driver: EncodeDriver::new(encoder, region.width, region.height),
            frame: FrameBuffer::new(region.width, region.height),
            region,
            fps,
        }
    }

    /// The composited RGB frame from the last iteration.
    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// One capture-to-transport pass.
    pub fn iterate(&mut self, writer: &TransportWriter) -> Result<StageTimings> {
        let started = Instant::now();
        self.source.capture(self.region, &mut self.frame)?;
        let grabbed = Instant::now();

        if let Some(cursor) = self.cursor.as_mut() {
            match cursor.query_cursor() {
                Ok(Some(image)) => composite_cursor(&mut self.frame, &image, self.region.origin()),
                Ok(None) => {}
                Err(e) => debug!("cursor skipped: {e}"),
            }
        }
        let composited = Instant::now();

        self.frame.make_top_down();
        self.converter
            .convert(self.frame.data(), self.frame.stride(), self.driver.frame_mut());
        let converted = Instant::now();

        self.driver.submit(writer)?;
        let encoded = Instant::now();

        Ok(StageTimings {
            grab: grabbed - started,
            composite: composited - grabbed,
            convert: converted - composited,
            encode: encoded - converted,
        })
    }

    /// Run paced iterations until `cancel` fires or a stage fails.
    pub fn run(mut self, writer: &TransportWriter, cancel: &CancellationToken) -> PipelineExit {
        info!(
            width = self.region.width,
            height = self.region.height,
            fps = self.fps,
            encoder = self.driver.encoder_name(),
            cursor = self.cursor.is_some(),
            "video pipeline started"
        );

        let pacer = FramePacer::new(FramePacer::interval_for(self.fps), Instant::now());
        let (pacing, result) = pacer.run(cancel, || self.iterate(writer));

        let exit = PipelineExit {
            stats: PipelineStats {
                iterations: pacing.iterations,
                messages: self.driver.packets_sent(),
                bytes: self.driver.bytes_sent(),
                overruns: pacing.overruns,
            },
            error: result.err(),
        };
        exit.log("video");
        exit
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::capture::{StaticCursor, TestPatternSource};
    use crate::convert::Bt601Converter;
    use crate::encoder::{Drain, EncoderSettings, ZstdDecoder, ZstdEncoder};
    use crate::frame::PlanarFrame;
    use crate::error::BeamError;
    use crate::frame::{CursorImage, RowOrder};
    use crate::transport::{MessageSink, StreamTag, TransportMessage};

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
            Err(BeamError::Transport("connection closed".into()))
        }
    }

    /// Solid black frames stored bottom-up.
    struct BottomUpBlack;

    impl FrameSource for BottomUpBlack {
        fn capture(&mut self, _region: CaptureRegion, frame: &mut FrameBuffer) -> Result<()> {
            frame.data_mut().fill(0);
            frame.set_row_order(RowOrder::BottomUp);
            Ok(())
        }
    }

    /// Refuses every frame.
    struct RejectingEncoder;

    impl VideoEncoder for RejectingEncoder {
        fn submit_frame(&mut self, _frame: &PlanarFrame, _pts: u64) -> Result<()> {
            Err(BeamError::EncoderSubmit("out of memory".into()))
        }

        fn drain_packet(&mut self) -> Result<Drain> {
            Ok(Drain::Pending)
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    fn pipeline(source: Box<dyn FrameSource>, cursor: Option<Box<dyn CursorSource>>) -> VideoPipeline {
        let region = CaptureRegion::new(0, 0, 16, 8);
        let encoder = ZstdEncoder::new(EncoderSettings::new(16, 8)).unwrap();
        VideoPipeline::new(source, cursor, Box::new(Bt601Converter), Box::new(encoder), region, 200)
    }

    #[test]
    fn iteration_emits_video_messages() {
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());
        let mut video = pipeline(Box::new(TestPatternSource::new()), None);

        video.iterate(&writer).unwrap();
        video.iterate(&writer).unwrap();

        let frames = sink.0.lock().unwrap();
        assert_eq!(frames.len(), 2);
        let mut decoder = ZstdDecoder::new();
        for (pts, frame) in frames.iter().enumerate() {
            let (tag, payload) = TransportMessage::decode(frame).unwrap();
            assert_eq!(tag, StreamTag::Video);
            let (header, _) = decoder.decode(payload).unwrap();
            assert_eq!(header.pts, pts as u64);
        }
    }

    #[test]
    fn cursor_lands_top_down_on_bottom_up_capture() {
        let writer = TransportWriter::new(VecSink::default());
        let cursor = StaticCursor::new(CursorImage::solid(1, 1, 0xffff_ffff, (3, 0)));
        let mut video = pipeline(Box::new(BottomUpBlack), Some(Box::new(cursor)));

        video.iterate(&writer).unwrap();

        let frame = video.frame();
        assert_eq!(frame.row_order(), RowOrder::TopDown);
        assert_eq!(frame.pixel(3, 0), [255, 255, 255]);
        assert_eq!(frame.data()[frame.offset(3, 0)], 255);
        assert_eq!(frame.pixel(3, 7), [0, 0, 0]);
    }

    #[test]
    fn write_failure_ends_the_pipeline() {
        let writer = TransportWriter::new(ClosedSink);
        let cancel = CancellationToken::new();
        let video = pipeline(Box::new(TestPatternSource::new()), None);

        let exit = video.run(&writer, &cancel);

        assert!(matches!(exit.error, Some(BeamError::Transport(_))));
        assert_eq!(exit.stats.iterations, 0);
        assert!(!cancel.is_cancelled());
    }

    #[test]
    fn encoder_submit_failure_ends_the_pipeline() {
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());
        let cancel = CancellationToken::new();
        let region = CaptureRegion::new(0, 0, 16, 8);
        let video = VideoPipeline::new(
            Box::new(TestPatternSource::new()),
            None,
            Box::new(Bt601Converter),
            Box::new(RejectingEncoder),
            region,
            200,
        );

        let exit = video.run(&writer, &cancel);

        assert!(matches!(exit.error, Some(BeamError::EncoderSubmit(_))));
        assert_eq!(exit.stats.iterations, 0);
        assert_eq!(exit.stats.messages, 0);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn cancellation_stops_cleanly() {
        let sink = VecSink::default();
        let writer = TransportWriter::new(sink.clone());
        let cancel = CancellationToken::new();
        let video = pipeline(Box::new(TestPatternSource::new()), Some(Box::new(StaticCursor::hidden())));

        let stopper = {
            let cancel = cancel.clone();
            std::thread::spawn(move || {
                std::thread::sleep(std::time::Duration::from_millis(50));
                cancel.cancel();
            })
        };
        let exit = video.run(&writer, &cancel);
        stopper.join().unwrap();

        assert!(exit.is_clean());
        assert!(exit.stats.iterations > 0);
        assert_eq!(exit.stats.messages, sink.0.lock().unwrap().len() as u64);
    }
}
