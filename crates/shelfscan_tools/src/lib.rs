//! Shared plumbing for the coco/zuppa binaries: artifact naming, splash
//! helpers, and the feature-gated video path.

pub mod video;

use anyhow::Context;
use chrono::Local;
use mask_core::interfaces::{Detector, Frame};
use mask_core::splash::color_splash;
use std::path::{Path, PathBuf};

/// Timestamped artifact name, e.g. `splash_20240801T103000.png`.
pub fn timestamped_name(prefix: &str, ext: &str) -> String {
    format!("{prefix}_{}.{ext}", Local::now().format("%Y%m%dT%H%M%S"))
}

/// Detect on a single image file and write the color-splash composite next
/// to the working directory. Returns the output path.
pub fn splash_image(detector: &mut dyn Detector, image_path: &Path) -> anyhow::Result<PathBuf> {
    println!("Running on {}", image_path.display());
    let img = image::open(image_path)
        .with_context(|| format!("failed to open image {}", image_path.display()))?
        .to_rgb8();

    let frame = Frame {
        id: 0,
        image: img.clone(),
        path: Some(image_path.to_path_buf()),
    };
    let detection = detector.detect(&frame);
    if detection.is_empty() {
        log::info!("no detections; whole frame goes gray");
    }

    let out = color_splash(&img, &detection.masks);
    let out_path = PathBuf::from(timestamped_name("splash", "png"));
    out.save(&out_path)
        .with_context(|| format!("failed to write {}", out_path.display()))?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamped_names_carry_prefix_and_extension() {
        let name = timestamped_name("splash", "avi");
        assert!(name.starts_with("splash_"));
        assert!(name.ends_with(".avi"));
        // prefix_ + YYYYMMDDTHHMMSS + .ext
        assert_eq!(name.len(), "splash_".len() + 15 + ".avi".len());
    }
}
