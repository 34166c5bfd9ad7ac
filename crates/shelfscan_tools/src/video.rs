//! Video color splash. OpenCV-backed frame iteration behind the `video`
//! feature; builds without it get a rebuild hint instead of the codec stack.

use mask_core::interfaces::Detector;
use std::path::Path;

#[cfg(feature = "video")]
pub fn splash_video(
    detector: &mut dyn Detector,
    video_path: &Path,
    out_path: &Path,
) -> anyhow::Result<()> {
    use anyhow::Context;
    use mask_core::interfaces::Frame;
    use mask_core::splash::color_splash;
    use opencv::core::{Mat, Size};
    use opencv::prelude::*;
    use opencv::videoio::{self, VideoCapture, VideoWriter};

    let path_str = video_path
        .to_str()
        .context("video path is not valid UTF-8")?;
    let mut capture = VideoCapture::from_file(path_str, videoio::CAP_ANY)
        .with_context(|| format!("failed to open video {}", video_path.display()))?;
    let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as i32;
    let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as i32;
    let fps = capture.get(videoio::CAP_PROP_FPS)?;

    let fourcc = VideoWriter::fourcc('M', 'J', 'P', 'G')?;
    let out_str = out_path.to_str().context("output path is not valid UTF-8")?;
    let mut writer = VideoWriter::new(out_str, fourcc, fps, Size::new(width, height), true)
        .with_context(|| format!("failed to open video writer {}", out_path.display()))?;

    let mut mat = Mat::default();
    let mut count: u64 = 0;
    loop {
        if !capture.read(&mut mat)? || mat.empty() {
            break;
        }
        println!("frame: {count}");

        // OpenCV hands frames over as BGR; swap into an RGB image buffer.
        let bytes = mat.data_bytes()?;
        let mut img = image::RgbImage::new(width as u32, height as u32);
        for (i, pixel) in img.pixels_mut().enumerate() {
            let base = i * 3;
            pixel[0] = bytes[base + 2];
            pixel[1] = bytes[base + 1];
            pixel[2] = bytes[base];
        }

        let frame = Frame {
            id: count,
            image: img.clone(),
            path: None,
        };
        let detection = detector.detect(&frame);
        let splash = color_splash(&img, &detection.masks);

        // RGB back to BGR for the writer.
        let mut bgr = vec![0u8; (width * height * 3) as usize];
        for (i, pixel) in splash.pixels().enumerate() {
            let base = i * 3;
            bgr[base] = pixel[2];
            bgr[base + 1] = pixel[1];
            bgr[base + 2] = pixel[0];
        }
        let out_mat = Mat::from_slice(&bgr)?.reshape(3, height)?.try_clone()?;
        writer.write(&out_mat)?;
        count += 1;
    }
    writer.release()?;
    Ok(())
}

#[cfg(not(feature = "video"))]
pub fn splash_video(
    _detector: &mut dyn Detector,
    _video_path: &Path,
    _out_path: &Path,
) -> anyhow::Result<()> {
    anyhow::bail!("video support not enabled; rebuild with --features video")
}
