//! X11 screen capture via core-protocol `GetImage` and XFixes cursors.
//!
//! Uses the pure-Rust `x11rb` connection, so no Xlib is linked. Frames
//! are grabbed from the root window in ZPixmap format; only 32 bits per
//! pixel layouts (depth 24/32 TrueColor, the norm on modern servers) are
//! accepted. Rows arrive top-down.

use x11rb::connection::Connection;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, ImageOrder, Window};
use x11rb::rust_connection::RustConnection;

use super::{CursorSource, FrameSource};
use crate::error::{BeamError, Result};
use crate::frame::{CaptureRegion, CursorImage, FrameBuffer, RowOrder};

fn connect(display: Option<&str>) -> Result<(RustConnection, usize)> {
    x11rb::connect(display).map_err(|e| BeamError::Capture(format!("cannot open display: {e}")))
}

// ── X11FrameSource ───────────────────────────────────────────────

pub struct X11FrameSource {
    conn: RustConnection,
    root: Window,
    screen_width: u16,
    screen_height: u16,
    lsb_first: bool,
}

impl X11FrameSource {
    /// Connect to `display` (or `$DISPLAY` when `None`).
    pub fn open(display: Option<&str>) -> Result<Self> {
        let (conn, screen_num) = connect(display)?;
        let setup = conn.setup();
        let screen = setup
            .roots
            .get(screen_num)
            .ok_or_else(|| BeamError::Capture(format!("screen {screen_num} does not exist")))?;
        let root = screen.root;
        let (screen_width, screen_height) = (screen.width_in_pixels, screen.height_in_pixels);
        let lsb_first = setup.image_byte_order == ImageOrder::LSB_FIRST;

        tracing::info!(screen_width, screen_height, screen = screen_num, "x11 display opened");

        Ok(Self {
            conn,
            root,
            screen_width,
            screen_height,
            lsb_first,
        })
    }

    /// Size of the root window in pixels.
    pub fn screen_size(&self) -> (u32, u32) {
        (self.screen_width as u32, self.screen_height as u32)
    }

    fn bits_per_pixel(&self, depth: u8) -> Option<u8> {
        self.conn
            .setup()
            .pixmap_formats
            .iter()
            .find(|f| f.depth == depth)
            .map(|f| f.bits_per_pixel)
    }
}

impl FrameSource for X11FrameSource {
    fn capture(&mut self, region: CaptureRegion, frame: &mut FrameBuffer) -> Result<()> {
        let reply = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                self.root,
                region.x as i16,
                region.y as i16,
                region.width as u16,
                region.height as u16,
                !0,
            )
            .map_err(|e| BeamError::Capture(format!("GetImage: {e}")))?
            .reply()
            .map_err(|e| BeamError::Capture(format!("GetImage reply: {e}")))?;

        if self.bits_per_pixel(reply.depth) != Some(32) {
            return Err(BeamError::UnsupportedFormat(format!(
                "depth {} is not stored as 32 bits per pixel",
                reply.depth
            )));
        }

        let pixels = region.width as usize * region.height as usize;
        if reply.data.len() != pixels * 4 || frame.data().len() != pixels * 3 {
            return Err(BeamError::FrameSizeMismatch {
                expected_width: frame.width(),
                expected_height: frame.height(),
                width: region.width,
                height: region.height,
            });
        }

        // LSB first: B G R X; MSB first: X R G B
        let (r, g, b) = if self.lsb_first { (2, 1, 0) } else { (1, 2, 3) };
        for (dst, src) in frame
            .data_mut()
            .chunks_exact_mut(3)
            .zip(reply.data.chunks_exact(4))
        {
            dst[0] = src[r];
            dst[1] = src[g];
            dst[2] = src[b];
        }
        frame.set_row_order(RowOrder::TopDown);
        Ok(())
    }
}

// ── X11CursorSource ──────────────────────────────────────────────

pub struct X11CursorSource {
    conn: RustConnection,
}

impl X11CursorSource {
    /// Connect and negotiate XFixes (cursor images need version 2+).
    pub fn open(display: Option<&str>) -> Result<Self> {
        let (conn, _) = connect(display)?;
        let version = conn
            .xfixes_query_version(5, 0)
            .map_err(|e| BeamError::Cursor(format!("XFixes: {e}")))?
            .reply()
            .map_err(|e| BeamError::Cursor(format!("XFixes unavailable: {e}")))?;
        if version.major_version < 2 {
            return Err(BeamError::Cursor(format!(
                "XFixes {}.{} cannot report cursor images",
                version.major_version, version.minor_version
            )));
        }
        Ok(Self { conn })
    }
}

impl CursorSource for X11CursorSource {
    fn query_cursor(&mut self) -> Result<Option<CursorImage>> {
        let reply = self
            .conn
            .xfixes_get_cursor_image()
            .map_err(|e| BeamError::Cursor(format!("GetCursorImage: {e}")))?
            .reply()
            .map_err(|e| BeamError::Cursor(format!("GetCursorImage reply: {e}")))?;

        if reply.width == 0 || reply.height == 0 {
            return Ok(None);
        }

        Ok(Some(CursorImage {
            width: reply.width as u32,
            height: reply.height as u32,
            hotspot: (reply.xhot as i32, reply.yhot as i32),
            position: (reply.x as i32, reply.y as i32),
            pixels: reply.cursor_image,
        }))
    }
}
