//! Packed RGB → planar I420 colour conversion.

use crate::frame::PlanarFrame;

/// Stateless colour converter between the compositor and the encoder.
pub trait Converter: Send {
    /// Convert packed RGB `src` (rows `src_stride` bytes apart) into
    /// `dst`, overwriting every visible sample of all three planes.
    fn convert(&self, src: &[u8], src_stride: usize, dst: &mut PlanarFrame);
}

/// Integer BT.601 limited-range converter.
///
/// Luma is computed per pixel; each chroma sample averages a 2×2 block.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bt601Converter;

impl Converter for Bt601Converter {
    fn convert(&self, src: &[u8], src_stride: usize, dst: &mut PlanarFrame) {
        let w = dst.width() as usize;
        let h = dst.height() as usize;
        let (y_plane, u_plane, v_plane, [y_stride, u_stride, v_stride]) = dst.planes_mut();

        for row in (0..h).step_by(2) {
            let top = &src[row * src_stride..row * src_stride + w * 3];
            let bottom = &src[(row + 1) * src_stride..(row + 1) * src_stride + w * 3];

            for col in (0..w).step_by(2) {
                let mut sum = [0i32; 3];
                for (dr, line) in [top, bottom].into_iter().enumerate() {
                    for dc in 0..2 {
                        let i = (col + dc) * 3;
                        let (r, g, b) = (line[i] as i32, line[i + 1] as i32, line[i + 2] as i32);
                        y_plane[(row + dr) * y_stride + col + dc] = luma(r, g, b);
                        sum[0] += r;
                        sum[1] += g;
                        sum[2] += b;
                    }
                }

                let (r, g, b) = ((sum[0] + 2) / 4, (sum[1] + 2) / 4, (sum[2] + 2) / 4);
                u_plane[(row / 2) * u_stride + col / 2] = chroma_u(r, g, b);
                v_plane[(row / 2) * v_stride + col / 2] = chroma_v(r, g, b);
            }
        }
    }
}

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> u8 {
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128) as u8
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> u8 {
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FrameBuffer;

    fn convert_solid(rgb: [u8; 3]) -> PlanarFrame {
        let src = FrameBuffer::filled(4, 4, rgb);
        let mut dst = PlanarFrame::new(4, 4);
        Bt601Converter.convert(src.data(), src.stride(), &mut dst);
        dst
    }

    fn visible(frame: &PlanarFrame, plane: usize) -> Vec<u8> {
        let (cols, rows) = frame.plane_size(plane);
        let stride = frame.strides()[plane];
        (0..rows)
            .flat_map(|r| frame.plane(plane)[r * stride..r * stride + cols].to_vec())
            .collect()
    }

    #[test]
    fn reference_colours() {
        let black = convert_solid([0, 0, 0]);
        assert!(visible(&black, 0).iter().all(|&y| y == 16));
        assert!(visible(&black, 1).iter().all(|&u| u == 128));
        assert!(visible(&black, 2).iter().all(|&v| v == 128));

        let white = convert_solid([255, 255, 255]);
        assert!(visible(&white, 0).iter().all(|&y| y == 235));
        assert!(visible(&white, 1).iter().all(|&u| u == 128));
        assert!(visible(&white, 2).iter().all(|&v| v == 128));
    }

    #[test]
    fn red_pushes_v_up_and_u_down() {
        let red = convert_solid([255, 0, 0]);
        assert_eq!(visible(&red, 0)[0], 82);
        assert!(visible(&red, 1)[0] < 128);
        assert_eq!(visible(&red, 2)[0], 240);
    }

    #[test]
    fn chroma_averages_two_by_two_blocks() {
        let mut src = FrameBuffer::new(2, 2);
        // one white pixel, three black: average r = g = b = 64
        src.data_mut()[..3].copy_from_slice(&[255, 255, 255]);
        let mut dst = PlanarFrame::new(2, 2);
        Bt601Converter.convert(src.data(), src.stride(), &mut dst);

        assert_eq!(dst.plane(0)[0], 235);
        assert_eq!(dst.plane(0)[1], 16);
        assert_eq!(dst.plane(1)[0], 128);
    }
}
