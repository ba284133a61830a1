//! Cursor overlay: alpha-blends a pointer bitmap into a captured frame.
//!
//! Screen grabs do not include the hardware cursor, so it is painted
//! back in on every frame before colour conversion. The blend is done
//! in place on the session's reused [`FrameBuffer`]; nothing is
//! allocated.

use crate::frame::{CursorImage, FrameBuffer};

/// Blend `cursor` into `frame`.
///
/// `origin` is the capture region's top-left corner in screen
/// coordinates. Cursor pixels that land outside the frame are skipped,
/// as are fully transparent ones. A cursor whose pixel count does not
/// match its dimensions is not drawn. Running this twice on the same
/// frame blends twice.
pub fn composite_cursor(frame: &mut FrameBuffer, cursor: &CursorImage, origin: (i32, i32)) {
    if cursor.pixels.len() as u64 != cursor.width as u64 * cursor.height as u64 {
        return;
    }
    let (left, top) = cursor.top_left();
    let base_x = left as i64 - origin.0 as i64;
    let base_y = top as i64 - origin.1 as i64;
    let (fw, fh) = (frame.width() as i64, frame.height() as i64);
    let cw = cursor.width as usize;

    for j in 0..cursor.height as i64 {
        let img_y = base_y + j;
        if img_y < 0 || img_y >= fh {
            continue;
        }
        let row = frame.storage_row(img_y as u32);

        for i in 0..cursor.width as i64 {
            let img_x = base_x + i;
            if img_x < 0 || img_x >= fw {
                continue;
            }

            let argb = cursor.pixels[j as usize * cw + i as usize];
            let alpha = argb >> 24;
            if alpha == 0 {
                continue;
            }

            let idx = frame.offset(img_x as u32, row);
            let px = &mut frame.data_mut()[idx..idx + 3];
            px[0] = blend((argb >> 16) & 0xff, px[0], alpha);
            px[1] = blend((argb >> 8) & 0xff, px[1], alpha);
            px[2] = blend(argb & 0xff, px[2], alpha);
        }
    }
}

/// `(c * a + b * (255 - a)) / 255`, truncating.
#[inline]
fn blend(cursor: u32, base: u8, alpha: u32) -> u8 {
    ((cursor * alpha + base as u32 * (255 - alpha)) / 255) as u8
}
