//! COCO results formatting: detections → records scoreable by COCO tooling.

use crate::types::{ClassMap, DatasetError, DatasetResult};
use mask_core::interfaces::Detection;
use mask_core::rle::Rle;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Segmentation payload in the results format: compressed-RLE string with
/// `size` as `[height, width]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RleSegmentation {
    pub size: [u32; 2],
    pub counts: String,
}

/// One detection in the COCO results format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CocoResult {
    pub image_id: i64,
    pub category_id: i64,
    /// Pixel `[x, y, w, h]`, rounded to one decimal.
    pub bbox: [f32; 4],
    pub score: f32,
    pub segmentation: RleSegmentation,
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

/// Arrange one image's detections to match the COCO results spec.
/// Detections whose class id has no source mapping are dropped.
pub fn build_coco_results(
    classes: &ClassMap,
    image_id: i64,
    detection: &Detection,
    dims: (u32, u32),
) -> Vec<CocoResult> {
    let (w, h) = dims;
    let mut results = Vec::with_capacity(detection.len());
    for i in 0..detection.len() {
        let internal = detection.class_ids[i].abs();
        let Some(category_id) = classes.to_source(internal) else {
            continue;
        };
        let b = detection.boxes[i];
        let x = b[0] * w as f32;
        let y = b[1] * h as f32;
        let bw = (b[2] - b[0]) * w as f32;
        let bh = (b[3] - b[1]) * h as f32;

        let rle = Rle::from_mask(&detection.masks[i]);
        results.push(CocoResult {
            image_id,
            category_id,
            bbox: [round1(x), round1(y), round1(bw), round1(bh)],
            score: detection.scores[i],
            segmentation: RleSegmentation {
                size: [rle.height, rle.width],
                counts: rle.to_string_encoded(),
            },
        });
    }
    results
}

/// Serialize result records to a JSON file.
pub fn write_results(path: &Path, results: &[CocoResult]) -> DatasetResult<()> {
    let json = serde_json::to_vec_pretty(results).map_err(|e| DatasetError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;
    fs::write(path, json).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mask_core::mask::InstanceMask;

    #[test]
    fn bbox_follows_xywh_convention() {
        let mut classes = ClassMap::new();
        classes.add_class("coco", 17, "cat");
        classes.prepare();

        let mut mask = InstanceMask::new(100, 80);
        mask.fill_rect(10, 20, 50, 60);
        let det = Detection {
            boxes: vec![[0.1, 0.25, 0.5, 0.75]],
            class_ids: vec![1],
            scores: vec![0.9],
            masks: vec![mask],
        };

        let results = build_coco_results(&classes, 42, &det, (100, 80));
        assert_eq!(results.len(), 1);
        let r = &results[0];
        assert_eq!(r.image_id, 42);
        assert_eq!(r.category_id, 17);
        // [x0,y0,x1,y1] normalized → pixel [x, y, w, h].
        assert_eq!(r.bbox, [10.0, 20.0, 40.0, 40.0]);
        assert_eq!(r.segmentation.size, [80, 100]);
    }

    #[test]
    fn unmapped_class_is_dropped() {
        let mut classes = ClassMap::new();
        classes.add_class("coco", 1, "thing");
        classes.prepare();
        let det = Detection {
            boxes: vec![[0.0, 0.0, 0.5, 0.5]],
            class_ids: vec![9],
            scores: vec![0.5],
            masks: vec![InstanceMask::new(10, 10)],
        };
        assert!(build_coco_results(&classes, 1, &det, (10, 10)).is_empty());
    }
}
