use image::{RgbImage, RgbaImage};

/// Alpha-blend `overlay` onto `base` in place, anchored at the top-left corner.
/// Only the overlapping region is touched.
pub fn composite_over(base: &mut RgbImage, overlay: &RgbaImage) {
    let width = base.width().min(overlay.width());
    let height = base.height().min(overlay.height());

    for y in 0..height {
        for x in 0..width {
            let src = overlay.get_pixel(x, y);
            let alpha = src[3] as u32;
            if alpha == 0 {
                continue;
            }
            let dst = base.get_pixel_mut(x, y);
            if alpha == 255 {
                dst.0 = [src[0], src[1], src[2]];
                continue;
            }
            for c in 0..3 {
                let blended = (src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha) + 127) / 255;
                dst[c] = blended as u8;
            }
        }
    }
}
