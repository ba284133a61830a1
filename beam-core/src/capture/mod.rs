//! Frame and cursor sources.
//!
//! | Module         | Source                                         |
//! |----------------|------------------------------------------------|
//! | `x11`          | X11 `GetImage` grabs + XFixes cursor (feature `x11`) |
//! | `test_pattern` | synthetic moving gradient, no display needed   |

pub mod test_pattern;
#[cfg(feature = "x11")]
pub mod x11;

pub use test_pattern::{StaticCursor, TestPatternSource};
#[cfg(feature = "x11")]
pub use x11::{X11CursorSource, X11FrameSource};

use crate::error::Result;
use crate::frame::{CaptureRegion, CursorImage, FrameBuffer};

/// Grabs a screen rectangle into the session's reused frame buffer.
pub trait FrameSource: Send {
    /// Fill `frame` with the pixels of `region`.
    ///
    /// `frame` is already sized to the region; a source that cannot
    /// deliver exactly that size must fail rather than resize it. The
    /// source also sets the buffer's row order.
    fn capture(&mut self, region: CaptureRegion, frame: &mut FrameBuffer) -> Result<()>;
}

/// Reports the current pointer image and position.
pub trait CursorSource: Send {
    /// `Ok(None)` when no cursor is visible; errors are reserved for a
    /// broken source.
    fn query_cursor(&mut self) -> Result<Option<CursorImage>>;
}
