//! Display-free sources for headless runs and tests.

use crate::error::Result;
use crate::frame::{CaptureRegion, CursorImage, FrameBuffer, RowOrder};

use super::{CursorSource, FrameSource};

/// Diagonal gradient that scrolls one pixel per frame.
#[derive(Debug, Default)]
pub struct TestPatternSource {
    frame_index: u32,
}

impl TestPatternSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames produced so far.
    pub fn frames(&self) -> u32 {
        self.frame_index
    }
}

impl FrameSource for TestPatternSource {
    fn capture(&mut self, region: CaptureRegion, frame: &mut FrameBuffer) -> Result<()> {
        let shift = self.frame_index;
        let width = frame.width();
        let data = frame.data_mut();
        for (i, px) in data.chunks_exact_mut(FrameBuffer::BYTES_PER_PIXEL).enumerate() {
            let x = (i as u32 % width).wrapping_add(region.x as u32);
            let y = (i as u32 / width).wrapping_add(region.y as u32);
            px[0] = x.wrapping_add(shift) as u8;
            px[1] = y.wrapping_add(shift) as u8;
            px[2] = (x ^ y) as u8;
        }
        frame.set_row_order(RowOrder::TopDown);
        self.frame_index = self.frame_index.wrapping_add(1);
        Ok(())
    }
}

/// Cursor source that always reports the same image.
#[derive(Debug, Clone)]
pub struct StaticCursor {
    cursor: Option<CursorImage>,
}

impl StaticCursor {
    pub fn new(cursor: CursorImage) -> Self {
        Self {
            cursor: Some(cursor),
        }
    }

    /// A source with no visible cursor.
    pub fn hidden() -> Self {
        Self { cursor: None }
    }

    /// 12×12 white arrow-ish block at `position`.
    pub fn arrow(position: (i32, i32)) -> Self {
        let size = 12u32;
        let mut pixels = vec![0u32; (size * size) as usize];
        for y in 0..size {
            for x in 0..=y {
                let edge = x == 0 || x == y || y == size - 1;
                pixels[(y * size + x) as usize] = if edge { 0xff00_0000 } else { 0xffff_ffff };
            }
        }
        Self::new(CursorImage {
            width: size,
            height: size,
            hotspot: (0, 0),
            position,
            pixels,
        })
    }
}

impl CursorSource for StaticCursor {
    fn query_cursor(&mut self) -> Result<Option<CursorImage>> {
        Ok(self.cursor.clone())
    }
}
