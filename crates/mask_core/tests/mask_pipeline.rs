//! Polygon → RLE → splash working together.

use image::{Rgb, RgbImage};
use mask_core::prelude::*;

#[test]
fn polygon_survives_rle_roundtrip_and_drives_splash() {
    let xs = [4.0, 12.0, 12.0, 4.0];
    let ys = [4.0, 4.0, 12.0, 12.0];
    let mask = fill_polygon(&xs, &ys, 16, 16);
    assert_eq!(mask.area(), 64);

    let rle = Rle::from_mask(&mask);
    let s = rle.to_string_encoded();
    let decoded = Rle::from_string_encoded(16, 16, &s)
        .unwrap()
        .to_mask()
        .unwrap();
    assert_eq!(decoded, mask);

    let mut img = RgbImage::new(16, 16);
    for p in img.pixels_mut() {
        *p = Rgb([250, 10, 10]);
    }
    let out = color_splash(&img, &[decoded]);
    // Inside the polygon the red survives; outside it is gray.
    assert_eq!(out.get_pixel(6, 6), &Rgb([250, 10, 10]));
    let outside = out.get_pixel(0, 0);
    assert_eq!(outside[0], outside[1]);
}

#[test]
fn merged_parts_match_union_area() {
    let a = fill_polygon(&[0.0, 8.0, 8.0, 0.0], &[0.0, 0.0, 8.0, 8.0], 16, 16);
    let b = fill_polygon(&[8.0, 16.0, 16.0, 8.0], &[8.0, 8.0, 16.0, 16.0], 16, 16);
    let merged = merge(&[a.clone(), b.clone()], 16, 16);
    assert_eq!(merged.area(), a.area() + b.area());
    assert_eq!(merged.bbox(), Some([0, 0, 16, 16]));
}
