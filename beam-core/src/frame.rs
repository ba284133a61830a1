//! Frame and image types shared by the video pipeline stages.
//!
//! These are **internal** buffers, allocated once per session and reused
//! on every iteration. Nothing here is serialised onto the wire; the
//! encoder output is what the viewer receives.

use crate::error::{BeamError, Result};

/// Stride alignment used for planar buffers (bytes).
pub const PLANE_ALIGN: usize = 32;

// ── CaptureRegion ────────────────────────────────────────────────

/// The screen rectangle captured on every frame.
///
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaptureRegion {
    /// Left edge in screen coordinates.
    pub x: i32,
    /// Top edge in screen coordinates.
    pub y: i32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl CaptureRegion {
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Top-left corner, used to translate screen coordinates into
    /// frame coordinates.
    pub const fn origin(&self) -> (i32, i32) {
        (self.x, self.y)
    }

    /// 4:2:0 subsampling needs both dimensions to be even and non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BeamError::InvalidConfig(format!(
                "capture region {}x{} is empty",
                self.width, self.height
            )));
        }
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(BeamError::InvalidConfig(format!(
                "capture region {}x{} must have even dimensions",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

// ── RowOrder ─────────────────────────────────────────────────────

/// Vertical ordering of rows in a [`FrameBuffer`].
///
/// X11 `GetImage` delivers rows top-down; GL read-back delivers them
/// bottom-up. Cursor coordinates are always top-down screen coordinates,
/// so the compositor needs to know which one it is writing into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowOrder {
    /// Row 0 is the top of the image.
    #[default]
    TopDown,
    /// Row 0 is the bottom of the image.
    BottomUp,
}

// ── FrameBuffer ──────────────────────────────────────────────────

/// Packed RGB frame, `width * height * 3` bytes, rows tightly packed.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    width: u32,
    height: u32,
    row_order: RowOrder,
    data: Vec<u8>,
}

impl FrameBuffer {
    /// Bytes per RGB pixel.
    pub const BYTES_PER_PIXEL: usize = 3;

    /// Allocate a zeroed frame buffer.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            row_order: RowOrder::TopDown,
            data: vec![0; width as usize * height as usize * Self::BYTES_PER_PIXEL],
        }
    }

    /// Allocate a buffer filled with one colour. Mostly useful in tests.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let mut frame = Self::new(width, height);
        for px in frame.data.chunks_exact_mut(Self::BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgb);
        }
        frame
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row pitch in bytes.
    pub fn stride(&self) -> usize {
        self.width as usize * Self::BYTES_PER_PIXEL
    }

    pub fn row_order(&self) -> RowOrder {
        self.row_order
    }

    /// Set by the frame source that filled the buffer.
    pub fn set_row_order(&mut self, order: RowOrder) {
        self.row_order = order;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Byte offset of the pixel at `(x, row)` where `row` is a storage
    /// row (not adjusted for [`RowOrder`]).
    #[inline]
    pub fn offset(&self, x: u32, row: u32) -> usize {
        (row as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL
    }

    /// Storage row holding the top-down image row `y`.
    #[inline]
    pub fn storage_row(&self, y: u32) -> u32 {
        match self.row_order {
            RowOrder::TopDown => y,
            RowOrder::BottomUp => self.height - 1 - y,
        }
    }

    /// RGB triple at top-down image coordinates `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let i = self.offset(x, self.storage_row(y));
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    /// Reorder storage rows in place so the buffer is top-down.
    pub fn make_top_down(&mut self) {
        if self.row_order == RowOrder::TopDown {
            return;
        }
        let stride = self.stride();
        let rows = self.height as usize;
        for top in 0..rows / 2 {
            let (head, tail) = self.data.split_at_mut((rows - 1 - top) * stride);
            head[top * stride..(top + 1) * stride].swap_with_slice(&mut tail[..stride]);
        }
        self.row_order = RowOrder::TopDown;
    }
}

// ── PlanarFrame ──────────────────────────────────────────────────

/// Planar 4:2:0 YUV frame (I420) with per-plane strides.
///
/// Strides are rounded up to [`PLANE_ALIGN`] bytes, so rows may carry
/// padding past `width` (luma) or `width / 2` (chroma).
#[derive(Debug, Clone)]
pub struct PlanarFrame {
    width: u32,
    height: u32,
    planes: [Vec<u8>; 3],
    strides: [usize; 3],
}

impl PlanarFrame {
    /// Allocate an I420 frame. `width` and `height` must be even.
    pub fn new(width: u32, height: u32) -> Self {
        let (w, h) = (width as usize, height as usize);
        let luma_stride = align_up(w, PLANE_ALIGN);
        let chroma_stride = align_up(w / 2, PLANE_ALIGN);
        Self {
            width,
            height,
            planes: [
                vec![0; luma_stride * h],
                vec![128; chroma_stride * (h / 2)],
                vec![128; chroma_stride * (h / 2)],
            ],
            strides: [luma_stride, chroma_stride, chroma_stride],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn strides(&self) -> [usize; 3] {
        self.strides
    }

    pub fn plane(&self, index: usize) -> &[u8] {
        &self.planes[index]
    }

    /// Mutable access to all three planes at once, for converters.
    pub fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8], [usize; 3]) {
        let strides = self.strides;
        let [y, u, v] = &mut self.planes;
        (y.as_mut_slice(), u.as_mut_slice(), v.as_mut_slice(), strides)
    }

    /// Visible size of plane `index` as `(columns, rows)`.
    pub fn plane_size(&self, index: usize) -> (usize, usize) {
        let (w, h) = (self.width as usize, self.height as usize);
        if index == 0 { (w, h) } else { (w / 2, h / 2) }
    }

    /// Append the visible bytes of every plane, dropping stride padding.
    pub fn write_packed(&self, out: &mut Vec<u8>) {
        for index in 0..3 {
            let (cols, rows) = self.plane_size(index);
            let stride = self.strides[index];
            for row in 0..rows {
                let start = row * stride;
                out.extend_from_slice(&self.planes[index][start..start + cols]);
            }
        }
    }

    /// Size of the output of [`write_packed`](Self::write_packed).
    pub fn packed_len(&self) -> usize {
        let (w, h) = (self.width as usize, self.height as usize);
        w * h + 2 * (w / 2) * (h / 2)
    }
}

#[inline]
const fn align_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

// ── CursorImage ──────────────────────────────────────────────────

/// A pointer image with its hotspot and absolute screen position.
///
/// Pixels are `0xAARRGGBB`, row-major, top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: u32,
    pub height: u32,
    /// Hotspot offset inside the bitmap.
    pub hotspot: (i32, i32),
    /// Absolute pointer position in screen coordinates.
    pub position: (i32, i32),
    pub pixels: Vec<u32>,
}

impl CursorImage {
    /// Single-colour cursor, handy for tests and synthetic sources.
    pub fn solid(width: u32, height: u32, argb: u32, position: (i32, i32)) -> Self {
        Self {
            width,
            height,
            hotspot: (0, 0),
            position,
            pixels: vec![argb; width as usize * height as usize],
        }
    }

    /// Screen coordinate of the bitmap's top-left pixel.
    pub fn top_left(&self) -> (i32, i32) {
        (
            self.position.0 - self.hotspot.0,
            self.position.1 - self.hotspot.1,
        )
    }
}
