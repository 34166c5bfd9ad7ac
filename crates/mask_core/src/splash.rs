//! Color-splash compositing: grayscale frame with color kept under the masks.

use crate::mask::InstanceMask;
use image::{Rgb, RgbImage};

/// Grayscale copy of the image with the original color restored wherever any
/// instance mask is set. With no instances the whole frame goes gray.
pub fn color_splash(image: &RgbImage, masks: &[InstanceMask]) -> RgbImage {
    let (w, h) = image.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, pixel) in image.enumerate_pixels() {
        let keep = masks.iter().any(|m| m.get(x, y));
        if keep {
            out.put_pixel(x, y, *pixel);
        } else {
            out.put_pixel(x, y, Rgb([luma(pixel); 3]));
        }
    }
    out
}

/// Rec. 709 luma, the same weighting used by common rgb2gray conversions.
#[inline]
fn luma(p: &Rgb<u8>) -> u8 {
    let v = 0.2125 * p[0] as f32 + 0.7154 * p[1] as f32 + 0.0721 * p[2] as f32;
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_pixels_keep_color_others_go_gray() {
        let mut img = RgbImage::new(4, 4);
        for p in img.pixels_mut() {
            *p = Rgb([200, 40, 40]);
        }
        let mut mask = InstanceMask::new(4, 4);
        mask.fill_rect(0, 0, 2, 2);

        let out = color_splash(&img, &[mask]);
        assert_eq!(out.get_pixel(0, 0), &Rgb([200, 40, 40]));
        let gray = out.get_pixel(3, 3);
        assert_eq!(gray[0], gray[1]);
        assert_eq!(gray[1], gray[2]);
    }

    #[test]
    fn no_masks_grays_everything() {
        let mut img = RgbImage::new(2, 2);
        img.put_pixel(0, 0, Rgb([10, 250, 30]));
        let out = color_splash(&img, &[]);
        let p = out.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }
}
