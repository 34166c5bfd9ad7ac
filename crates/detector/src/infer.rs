//! Inference: checkpoint loading with fallback, confidence filtering,
//! non-max suppression, and instance-mask synthesis.

use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use std::path::Path;

use mask_core::interfaces::{Detection, Detector, Frame};
use mask_core::mask::InstanceMask;

use crate::config::NetConfig;
use crate::model::{image_features_rgb, SegHead, SegHeadConfig};
use crate::TrainBackend;

/// IoU of two `[x0, y0, x1, y1]` boxes.
pub fn iou_xyxy(a: [f32; 4], b: [f32; 4]) -> f32 {
    let ax0 = a[0].min(a[2]);
    let ay0 = a[1].min(a[3]);
    let ax1 = a[0].max(a[2]);
    let ay1 = a[1].max(a[3]);
    let bx0 = b[0].min(b[2]);
    let by0 = b[1].min(b[3]);
    let bx1 = b[0].max(b[2]);
    let by1 = b[1].max(b[3]);

    let inter_w = (ax1.min(bx1) - ax0.max(bx0)).max(0.0);
    let inter_h = (ay1.min(by1) - ay0.max(by0)).max(0.0);
    let inter_area = inter_w * inter_h;

    let area_a = (ax1 - ax0).max(0.0) * (ay1 - ay0).max(0.0);
    let area_b = (bx1 - bx0).max(0.0) * (by1 - by0).max(0.0);
    let denom = area_a + area_b - inter_area;
    if denom <= 0.0 {
        0.0
    } else {
        inter_area / denom
    }
}

/// Greedy NMS: keep indices in descending score order, dropping boxes that
/// overlap a kept one above `iou_thresh`.
fn nms(boxes: &[[f32; 4]], scores: &[f32], iou_thresh: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..boxes.len()).collect();
    order.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal));
    let mut keep: Vec<usize> = Vec::new();
    for &i in &order {
        if keep.iter().all(|&k| iou_xyxy(boxes[i], boxes[k]) < iou_thresh) {
            keep.push(i);
        }
    }
    keep
}

/// Load a checkpoint into a fresh head; mismatched or unreadable files fall
/// back to fresh initialization with a warning, so callers always get a
/// usable model.
pub fn load_head<B: Backend>(
    cfg: &NetConfig,
    weights: Option<&Path>,
    device: &B::Device,
) -> SegHead<B> {
    let fresh = SegHead::<B>::new(SegHeadConfig::from_net(cfg), device);
    let Some(path) = weights else {
        log::warn!("no weights provided; using freshly initialized detector");
        return fresh;
    };
    if !path.exists() {
        log::warn!(
            "weights {} not found; using freshly initialized detector",
            path.display()
        );
        return fresh;
    }
    let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
    match fresh.clone().load_file(path, &recorder, device) {
        Ok(model) => model,
        Err(err) => {
            log::warn!(
                "failed to load detector checkpoint {}: {err}; using fresh initialization",
                path.display()
            );
            fresh
        }
    }
}

/// `load_head` pinned to the inference backend.
pub fn load_detector(
    cfg: &NetConfig,
    weights: Option<&Path>,
    device: &<TrainBackend as Backend>::Device,
) -> SegHead<TrainBackend> {
    load_head::<TrainBackend>(cfg, weights, device)
}

/// `Detector` implementation over the Burn head.
pub struct BurnDetector {
    model: SegHead<TrainBackend>,
    config: NetConfig,
    device: <TrainBackend as Backend>::Device,
}

impl BurnDetector {
    pub fn new(model: SegHead<TrainBackend>, config: NetConfig) -> Self {
        Self {
            model,
            config,
            device: <TrainBackend as Backend>::Device::default(),
        }
    }

    /// Resolve weights and build a detector in one step.
    pub fn from_weights(config: NetConfig, weights: Option<&Path>) -> Self {
        let device = <TrainBackend as Backend>::Device::default();
        let model = load_detector(&config, weights, &device);
        Self {
            model,
            config,
            device,
        }
    }
}

impl Detector for BurnDetector {
    fn detect(&mut self, frame: &Frame) -> Detection {
        let features = image_features_rgb(&frame.image);
        let input = Tensor::<TrainBackend, 2>::from_data(
            TensorData::new(features.to_vec(), [1, features.len()]),
            &self.device,
        );
        let (boxes_t, scores_t, class_logits_t) = self.model.forward_detect(input);

        let d = self.model.max_detections();
        let c = self.model.num_classes();
        let boxes_v = boxes_t.into_data().to_vec::<f32>().unwrap_or_default();
        let scores_v = scores_t.into_data().to_vec::<f32>().unwrap_or_default();
        let class_v = class_logits_t
            .into_data()
            .to_vec::<f32>()
            .unwrap_or_default();
        if boxes_v.len() < d * 4 || scores_v.len() < d || class_v.len() < d * c {
            return Detection::default();
        }

        let mut boxes = Vec::new();
        let mut scores = Vec::new();
        let mut class_ids = Vec::new();
        for i in 0..d {
            let score = scores_v.get(i).copied().unwrap_or(0.0);
            if score < self.config.detection_min_confidence {
                continue;
            }
            let b = [
                boxes_v[i * 4],
                boxes_v[i * 4 + 1],
                boxes_v[i * 4 + 2],
                boxes_v[i * 4 + 3],
            ];
            if b[2] - b[0] <= 0.0 || b[3] - b[1] <= 0.0 {
                continue;
            }
            // Foreground argmax; slot 0 is background.
            let logits = &class_v[i * c..(i + 1) * c];
            let (best_class, _) = logits
                .iter()
                .enumerate()
                .skip(1)
                .fold((1usize, f32::NEG_INFINITY), |acc, (j, &v)| {
                    if v > acc.1 {
                        (j, v)
                    } else {
                        acc
                    }
                });
            boxes.push(b);
            scores.push(score);
            class_ids.push(best_class as i32);
        }

        let keep = nms(&boxes, &scores, self.config.detection_nms_threshold);
        let (w, h) = frame.dimensions();
        let mut detection = Detection::default();
        for &i in &keep {
            let b = boxes[i];
            let mut mask = InstanceMask::new(w, h);
            let x0 = (b[0] * w as f32).floor().max(0.0) as u32;
            let y0 = (b[1] * h as f32).floor().max(0.0) as u32;
            let x1 = (b[2] * w as f32).ceil() as u32;
            let y1 = (b[3] * h as f32).ceil() as u32;
            mask.fill_rect(x0, y0, x1.min(w), y1.min(h));

            detection.boxes.push(b);
            detection.scores.push(scores[i]);
            detection.class_ids.push(class_ids[i]);
            detection.masks.push(mask);
        }
        detection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.1, 0.1, 0.5, 0.5];
        assert!((iou_xyxy(b, b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(iou_xyxy([0.0, 0.0, 0.2, 0.2], [0.5, 0.5, 0.9, 0.9]), 0.0);
    }

    #[test]
    fn nms_drops_overlapping_lower_scores() {
        let boxes = vec![
            [0.0, 0.0, 0.5, 0.5],
            [0.01, 0.01, 0.5, 0.5],
            [0.6, 0.6, 0.9, 0.9],
        ];
        let scores = vec![0.9, 0.8, 0.7];
        let keep = nms(&boxes, &scores, 0.5);
        assert_eq!(keep, vec![0, 2]);
    }
}
