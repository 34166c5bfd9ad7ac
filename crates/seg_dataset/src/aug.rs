//! Image augmentation and transformation pipeline for training samples.

use crate::types::ImageRecord;
use image::imageops::FilterType;
use rand::{Rng, SeedableRng};
use std::cmp::max;

/// A prepared training sample: normalized CHW pixels plus per-instance
/// normalized boxes and internal class ids (crowd instances excluded).
#[derive(Debug, Clone)]
pub struct DatasetSample {
    pub id: i64,
    /// Image in CHW layout, normalized to [0, 1].
    pub image_chw: Vec<f32>,
    pub width: u32,
    pub height: u32,
    /// Normalized boxes `[x0, y0, x1, y1]` in 0..1.
    pub boxes: Vec<[f32; 4]>,
    /// Internal class ids aligned with `boxes`.
    pub class_ids: Vec<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    /// Stretch to fill the target dimensions (may distort boxes).
    Force,
    /// Preserve aspect ratio; pad to a square-ish target with zeros.
    Letterbox,
}

/// Configuration for the transform pipeline. Probabilities of 0 disable the
/// corresponding augmentation, which is how evaluation pipelines are built.
#[derive(Debug, Clone)]
pub struct TransformConfig {
    /// Resize all images to this (width, height). If None, native size is kept.
    pub target_size: Option<(u32, u32)>,
    pub resize_mode: ResizeMode,
    /// Probability of a horizontal flip (boxes mirrored).
    pub flip_horizontal_prob: f32,
    /// Probability and strength of brightness/contrast jitter.
    pub color_jitter_prob: f32,
    pub color_jitter_strength: f32,
    /// Probability and range of scale jitter (zoom with center crop/pad).
    pub scale_jitter_prob: f32,
    pub scale_jitter_min: f32,
    pub scale_jitter_max: f32,
    /// Probability and amplitude of per-channel uniform noise.
    pub noise_prob: f32,
    pub noise_strength: f32,
    /// Probability and sigma of a Gaussian blur.
    pub blur_prob: f32,
    pub blur_sigma: f32,
    /// Cap on instances per image; extras are dropped.
    pub max_instances: usize,
    /// Seed for per-sample deterministic augmentation.
    pub seed: Option<u64>,
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            target_size: Some((512, 512)),
            resize_mode: ResizeMode::Letterbox,
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            color_jitter_strength: 0.1,
            scale_jitter_prob: 0.0,
            scale_jitter_min: 0.8,
            scale_jitter_max: 1.2,
            noise_prob: 0.0,
            noise_strength: 0.02,
            blur_prob: 0.0,
            blur_sigma: 1.0,
            max_instances: 16,
            seed: None,
        }
    }
}

impl TransformConfig {
    /// Evaluation/inference variant: same geometry, no randomness.
    pub fn eval(&self) -> Self {
        Self {
            flip_horizontal_prob: 0.0,
            color_jitter_prob: 0.0,
            scale_jitter_prob: 0.0,
            noise_prob: 0.0,
            blur_prob: 0.0,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransformPipeline {
    cfg: TransformConfig,
}

impl TransformPipeline {
    pub fn new(cfg: TransformConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.cfg
    }

    pub fn describe(&self) -> String {
        let c = &self.cfg;
        let ts = c
            .target_size
            .map(|(w, h)| format!("{}x{}", w, h))
            .unwrap_or_else(|| "native".to_string());
        format!(
            "target_size={} resize={:?} flip_p={:.2} color_jitter_p={:.2} scale_jitter_p={:.2} noise_p={:.2} blur_p={:.2} max_instances={} seed={}",
            ts,
            c.resize_mode,
            c.flip_horizontal_prob,
            c.color_jitter_prob,
            c.scale_jitter_prob,
            c.noise_prob,
            c.blur_prob,
            c.max_instances,
            c.seed.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string())
        )
    }

    /// Build a training sample from a decoded image and its record.
    /// Boxes are derived from instance masks; crowd instances (negative
    /// class ids) do not contribute boxes.
    pub fn apply(&self, img: image::RgbImage, record: &ImageRecord) -> DatasetSample {
        let (orig_w, orig_h) = img.dimensions();
        let (mut boxes, mut class_ids) = boxes_from_record(record);

        // Per-sample deterministic RNG when seeded, thread-local otherwise.
        let mut rng_local;
        let mut seeded_rng;
        let rng: &mut dyn rand::RngCore = if let Some(seed) = self.cfg.seed {
            let mixed = seed ^ record.id as u64;
            seeded_rng = rand::rngs::StdRng::seed_from_u64(mixed);
            &mut seeded_rng
        } else {
            rng_local = rand::rng();
            &mut rng_local
        };

        let (mut img, width, height) = match self.cfg.target_size {
            None => (img, orig_w, orig_h),
            Some((w, h)) => match self.cfg.resize_mode {
                ResizeMode::Force => {
                    let resized = image::imageops::resize(&img, w, h, FilterType::Triangle);
                    (resized, w, h)
                }
                ResizeMode::Letterbox => {
                    let (canvas, pad_w, pad_h, scale) = letterbox_resize(&img, w, h);
                    for b in boxes.iter_mut() {
                        let px = [
                            b[0] * orig_w as f32 * scale + pad_w as f32,
                            b[1] * orig_h as f32 * scale + pad_h as f32,
                            b[2] * orig_w as f32 * scale + pad_w as f32,
                            b[3] * orig_h as f32 * scale + pad_h as f32,
                        ];
                        *b = [
                            (px[0] / w as f32).clamp(0.0, 1.0),
                            (px[1] / h as f32).clamp(0.0, 1.0),
                            (px[2] / w as f32).clamp(0.0, 1.0),
                            (px[3] / h as f32).clamp(0.0, 1.0),
                        ];
                    }
                    (canvas, w, h)
                }
            },
        };

        maybe_hflip(&mut img, &mut boxes, self.cfg.flip_horizontal_prob, rng);
        maybe_jitter(
            &mut img,
            self.cfg.color_jitter_prob,
            self.cfg.color_jitter_strength,
            rng,
        );
        maybe_scale_jitter(
            &mut img,
            &mut boxes,
            self.cfg.scale_jitter_prob,
            self.cfg.scale_jitter_min,
            self.cfg.scale_jitter_max,
            rng,
        );
        maybe_noise(&mut img, self.cfg.noise_prob, self.cfg.noise_strength, rng);
        maybe_blur(&mut img, self.cfg.blur_prob, self.cfg.blur_sigma, rng);

        if boxes.len() > self.cfg.max_instances {
            boxes.truncate(self.cfg.max_instances);
            class_ids.truncate(self.cfg.max_instances);
        }

        let mut image_chw = vec![0.0f32; (width * height * 3) as usize];
        let plane = (width * height) as usize;
        for (x, y, pixel) in img.enumerate_pixels() {
            let base = (y * width + x) as usize;
            image_chw[base] = pixel[0] as f32 / 255.0;
            image_chw[plane + base] = pixel[1] as f32 / 255.0;
            image_chw[2 * plane + base] = pixel[2] as f32 / 255.0;
        }

        DatasetSample {
            id: record.id,
            image_chw,
            width,
            height,
            boxes,
            class_ids,
        }
    }
}

fn boxes_from_record(record: &ImageRecord) -> (Vec<[f32; 4]>, Vec<i32>) {
    let mut boxes = Vec::new();
    let mut class_ids = Vec::new();
    for inst in &record.instances {
        if inst.class_id <= 0 {
            continue;
        }
        if let Some(b) = inst.mask.bbox_norm() {
            boxes.push(b);
            class_ids.push(inst.class_id);
        }
    }
    (boxes, class_ids)
}

fn letterbox_resize(
    img: &image::RgbImage,
    target_w: u32,
    target_h: u32,
) -> (image::RgbImage, u32, u32, f32) {
    let (w, h) = img.dimensions();
    let scale = f32::min(target_w as f32 / w as f32, target_h as f32 / h as f32);
    let new_w = max(1, (w as f32 * scale).round() as u32);
    let new_h = max(1, (h as f32 * scale).round() as u32);
    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);

    let pad_w = (target_w - new_w.min(target_w)) / 2;
    let pad_h = (target_h - new_h.min(target_h)) / 2;

    let mut canvas = image::RgbImage::new(target_w, target_h);
    image::imageops::replace(&mut canvas, &resized, pad_w.into(), pad_h.into());
    (canvas, pad_w, pad_h, scale)
}

pub(crate) fn maybe_hflip(
    img: &mut image::RgbImage,
    boxes: &mut [[f32; 4]],
    prob: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) < prob {
        image::imageops::flip_horizontal_in_place(img);
        for b in boxes.iter_mut() {
            let x0 = b[0];
            let x1 = b[2];
            b[0] = (1.0 - x1).clamp(0.0, 1.0);
            b[2] = (1.0 - x0).clamp(0.0, 1.0);
        }
    }
}

pub(crate) fn maybe_jitter(
    img: &mut image::RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let bright = 1.0 + rng.random_range(-strength..strength);
    let contrast = 1.0 + rng.random_range(-strength..strength);
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let v = pixel[c] as f32 / 255.0;
            let mut v = (v - 0.5) * contrast + 0.5;
            v *= bright;
            pixel[c] = (v.clamp(0.0, 1.0) * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_noise(
    img: &mut image::RgbImage,
    prob: f32,
    strength: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || strength <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    for pixel in img.pixels_mut() {
        for c in 0..3 {
            let noise = rng.random_range(-strength..strength);
            let v = (pixel[c] as f32 / 255.0 + noise).clamp(0.0, 1.0);
            pixel[c] = (v * 255.0) as u8;
        }
    }
}

pub(crate) fn maybe_scale_jitter(
    img: &mut image::RgbImage,
    boxes: &mut [[f32; 4]],
    prob: f32,
    min_scale: f32,
    max_scale: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || min_scale <= 0.0 || max_scale <= min_scale {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let scale = rng.random_range(min_scale..max_scale);
    let (w, h) = img.dimensions();
    let new_w = max(1, (w as f32 * scale).round() as u32);
    let new_h = max(1, (h as f32 * scale).round() as u32);

    let resized = image::imageops::resize(img, new_w, new_h, FilterType::Triangle);
    let mut canvas = image::RgbImage::new(w, h);

    // Zoom in: crop center. Zoom out: pad center. Either way boxes remap
    // through the same scale + offset.
    let (off_x, off_y) = if new_w >= w {
        let x0 = ((new_w - w) / 2) as i64;
        let y0 = ((new_h - h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, -x0, -y0);
        (-(x0 as f32), -(y0 as f32))
    } else {
        let x0 = ((w - new_w) / 2) as i64;
        let y0 = ((h - new_h) / 2) as i64;
        image::imageops::replace(&mut canvas, &resized, x0, y0);
        (x0 as f32, y0 as f32)
    };

    for b in boxes.iter_mut() {
        let mut px0 = b[0] * w as f32 * scale + off_x;
        let mut py0 = b[1] * h as f32 * scale + off_y;
        let mut px1 = b[2] * w as f32 * scale + off_x;
        let mut py1 = b[3] * h as f32 * scale + off_y;
        px0 = px0.clamp(0.0, w as f32);
        py0 = py0.clamp(0.0, h as f32);
        px1 = px1.clamp(px0, w as f32);
        py1 = py1.clamp(py0, h as f32);
        b[0] = px0 / w as f32;
        b[1] = py0 / h as f32;
        b[2] = px1 / w as f32;
        b[3] = py1 / h as f32;
    }

    *img = canvas;
}

pub(crate) fn maybe_blur(
    img: &mut image::RgbImage,
    prob: f32,
    sigma: f32,
    rng: &mut dyn rand::RngCore,
) {
    if prob <= 0.0 || sigma <= 0.0 {
        return;
    }
    if rng.random_range(0.0..1.0) >= prob {
        return;
    }
    let blurred = image::imageops::blur(img, sigma);
    *img = blurred;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ImageRecord, InstanceAnn};
    use mask_core::mask::InstanceMask;
    use rand::rng;
    use std::path::PathBuf;

    fn record_with_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> ImageRecord {
        let mut mask = InstanceMask::new(w, h);
        mask.fill_rect(x0, y0, x1, y1);
        ImageRecord {
            id: 7,
            path: PathBuf::from("unused.png"),
            width: w,
            height: h,
            instances: vec![InstanceAnn { class_id: 1, mask }],
        }
    }

    #[test]
    fn hflip_boxes_are_mirrored() {
        let mut img = image::RgbImage::new(4, 4);
        let mut boxes = vec![[0.25, 0.0, 0.75, 1.0]];
        let mut rng = rng();
        maybe_hflip(&mut img, &mut boxes, 1.0, &mut rng);
        let flipped = boxes[0];
        assert!((flipped[0] - 0.25).abs() < 1e-6);
        assert!((flipped[2] - 0.75).abs() < 1e-6);
        assert!(flipped[0] < flipped[2]);
    }

    #[test]
    fn crowd_instances_do_not_contribute_boxes() {
        let mut record = record_with_rect(8, 8, 2, 2, 6, 6);
        record.instances[0].class_id = -1;
        let pipeline = TransformPipeline::new(TransformConfig {
            target_size: None,
            ..TransformConfig::default()
        });
        let sample = pipeline.apply(image::RgbImage::new(8, 8), &record);
        assert!(sample.boxes.is_empty());
        assert!(sample.class_ids.is_empty());
    }

    #[test]
    fn seeded_pipeline_is_deterministic() {
        let record = record_with_rect(16, 16, 2, 2, 10, 10);
        let cfg = TransformConfig {
            target_size: Some((8, 8)),
            resize_mode: ResizeMode::Force,
            flip_horizontal_prob: 0.5,
            color_jitter_prob: 0.5,
            noise_prob: 0.5,
            seed: Some(11),
            ..TransformConfig::default()
        };
        let pipeline = TransformPipeline::new(cfg);
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([120, 80, 40]));
        let a = pipeline.apply(img.clone(), &record);
        let b = pipeline.apply(img, &record);
        assert_eq!(a.image_chw, b.image_chw);
        assert_eq!(a.boxes, b.boxes);
    }

    #[test]
    fn force_resize_keeps_normalized_boxes() {
        let record = record_with_rect(16, 16, 4, 4, 12, 12);
        let pipeline = TransformPipeline::new(TransformConfig {
            target_size: Some((8, 8)),
            resize_mode: ResizeMode::Force,
            ..TransformConfig::default()
        });
        let sample = pipeline.apply(image::RgbImage::new(16, 16), &record);
        assert_eq!((sample.width, sample.height), (8, 8));
        let b = sample.boxes[0];
        assert!((b[0] - 0.25).abs() < 1e-5);
        assert!((b[2] - 0.75).abs() < 1e-5);
        assert_eq!(sample.class_ids, vec![1]);
    }
}
