//! Burn detection head: box, score, and class outputs from image summary
//! features.
//!
//! This is a compact stand-in with the entry-point shape of a full
//! instance-segmentation network; the backbone it would sit on is an
//! external concern.

use burn::module::Module;
use burn::nn;
use burn::tensor::activation::{relu, sigmoid};
use burn::tensor::backend::Backend;
use burn::tensor::Tensor;

use crate::config::NetConfig;

/// Length of the image summary feature vector fed to the head:
/// mean RGB, std RGB, aspect ratio, constant bias.
pub const FEATURE_DIM: usize = 8;

#[derive(Debug, Clone)]
pub struct SegHeadConfig {
    pub hidden: usize,
    pub depth: usize,
    pub max_detections: usize,
    pub num_classes: usize,
}

impl Default for SegHeadConfig {
    fn default() -> Self {
        Self {
            hidden: 128,
            depth: 2,
            max_detections: 32,
            num_classes: 2,
        }
    }
}

impl SegHeadConfig {
    pub fn from_net(cfg: &NetConfig) -> Self {
        Self {
            num_classes: cfg.num_classes.max(2),
            max_detections: cfg.max_gt_instances.max(1) * 2,
            ..Self::default()
        }
    }
}

#[derive(Debug, Module)]
pub struct SegHead<B: Backend> {
    stem: nn::Linear<B>,
    blocks: Vec<nn::Linear<B>>,
    box_head: nn::Linear<B>,
    score_head: nn::Linear<B>,
    class_head: nn::Linear<B>,
    max_detections: usize,
    num_classes: usize,
}

impl<B: Backend> SegHead<B> {
    pub fn new(cfg: SegHeadConfig, device: &B::Device) -> Self {
        let max_detections = cfg.max_detections.max(1);
        let num_classes = cfg.num_classes.max(2);
        let stem = nn::LinearConfig::new(FEATURE_DIM, cfg.hidden).init(device);
        let mut blocks = Vec::new();
        for _ in 0..cfg.depth {
            blocks.push(nn::LinearConfig::new(cfg.hidden, cfg.hidden).init(device));
        }
        let box_head = nn::LinearConfig::new(cfg.hidden, max_detections * 4).init(device);
        let score_head = nn::LinearConfig::new(cfg.hidden, max_detections).init(device);
        let class_head =
            nn::LinearConfig::new(cfg.hidden, max_detections * num_classes).init(device);
        Self {
            stem,
            blocks,
            box_head,
            score_head,
            class_head,
            max_detections,
            num_classes,
        }
    }

    pub fn max_detections(&self) -> usize {
        self.max_detections
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Detection forward pass: returns
    /// (boxes `[B, D, 4]` ordered/clamped to 0..1, scores `[B, D]`,
    /// class logits `[B, D, C]`).
    pub fn forward_detect(
        &self,
        input: Tensor<B, 2>,
    ) -> (Tensor<B, 3>, Tensor<B, 2>, Tensor<B, 3>) {
        let mut x = relu(self.stem.forward(input));
        for block in &self.blocks {
            x = relu(block.forward(x));
        }
        let boxes_flat = sigmoid(self.box_head.forward(x.clone()));
        let scores = sigmoid(self.score_head.forward(x.clone()));
        let class_logits = self.class_head.forward(x);

        let batch = boxes_flat.dims()[0];
        let boxes = boxes_flat.reshape([batch, self.max_detections, 4]);
        let class_logits = class_logits.reshape([batch, self.max_detections, self.num_classes]);

        // Reorder/clamp to enforce x0 <= x1, y0 <= y1 using arithmetic.
        let d = self.max_detections;
        let x0 = boxes.clone().slice([0..batch, 0..d, 0..1]);
        let y0 = boxes.clone().slice([0..batch, 0..d, 1..2]);
        let x1 = boxes.clone().slice([0..batch, 0..d, 2..3]);
        let y1 = boxes.clone().slice([0..batch, 0..d, 3..4]);

        let dx = x0.clone() - x1.clone();
        let dy = y0.clone() - y1.clone();
        let half = 0.5;

        let x_min = ((x0.clone() + x1.clone() - dx.clone().abs()) * half).clamp(0.0, 1.0);
        let x_max = ((x0 + x1 + dx.abs()) * half).clamp(0.0, 1.0);
        let y_min = ((y0.clone() + y1.clone() - dy.clone().abs()) * half).clamp(0.0, 1.0);
        let y_max = ((y0 + y1 + dy.abs()) * half).clamp(0.0, 1.0);

        let boxes_ordered = Tensor::cat(vec![x_min, y_min, x_max, y_max], 2);
        (boxes_ordered, scores, class_logits)
    }
}

/// Summary features of a CHW f32 image buffer: per-channel mean and
/// standard deviation, aspect ratio, constant bias slot.
pub fn image_features(image_chw: &[f32], width: u32, height: u32) -> [f32; FEATURE_DIM] {
    let plane = (width as usize) * (height as usize);
    let mut mean = [0.0f32; 3];
    let mut std = [0.0f32; 3];
    if plane > 0 && image_chw.len() >= plane * 3 {
        for c in 0..3 {
            let channel = &image_chw[c * plane..(c + 1) * plane];
            let m: f32 = channel.iter().sum::<f32>() / plane as f32;
            let var: f32 =
                channel.iter().map(|v| (v - m) * (v - m)).sum::<f32>() / plane as f32;
            mean[c] = m;
            std[c] = var.sqrt();
        }
    }
    let aspect = if height > 0 {
        width as f32 / height as f32
    } else {
        0.0
    };
    [
        mean[0], mean[1], mean[2], std[0], std[1], std[2], aspect, 1.0,
    ]
}

/// Summary features straight from a decoded RGB image.
pub fn image_features_rgb(img: &image::RgbImage) -> [f32; FEATURE_DIM] {
    let (w, h) = img.dimensions();
    let plane = (w as usize) * (h as usize);
    let mut chw = vec![0.0f32; plane * 3];
    for (x, y, pixel) in img.enumerate_pixels() {
        let base = (y * w + x) as usize;
        chw[base] = pixel[0] as f32 / 255.0;
        chw[plane + base] = pixel[1] as f32 / 255.0;
        chw[2 * plane + base] = pixel[2] as f32 / 255.0;
    }
    image_features(&chw, w, h)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn features_of_uniform_image() {
        let img = image::RgbImage::from_pixel(4, 2, image::Rgb([255, 0, 127]));
        let f = image_features_rgb(&img);
        assert!((f[0] - 1.0).abs() < 1e-6);
        assert!(f[1].abs() < 1e-6);
        assert!(f[3].abs() < 1e-6); // uniform → zero std
        assert!((f[6] - 2.0).abs() < 1e-6);
        assert!((f[7] - 1.0).abs() < 1e-6);
    }
}
