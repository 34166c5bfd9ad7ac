//! COCO-style dataset adapter: `<root>/<subset>/instances.json` with images
//! alongside the annotation file.

use crate::types::{
    ClassMap, Dataset, DatasetError, DatasetResult, ImageRecord, InstanceAnn, Subset,
};
use mask_core::mask::{fill_polygon, merge, InstanceMask};
use mask_core::rle::Rle;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

pub const COCO_SOURCE: &str = "coco";

#[derive(Debug, Deserialize)]
struct CocoJson {
    images: Vec<CocoImage>,
    annotations: Vec<CocoAnnotation>,
    categories: Vec<CocoCategory>,
}

#[derive(Debug, Deserialize)]
struct CocoImage {
    id: i64,
    file_name: String,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct CocoCategory {
    id: i64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CocoAnnotation {
    image_id: i64,
    category_id: i64,
    #[serde(default)]
    iscrowd: i64,
    segmentation: Option<Segmentation>,
}

/// COCO stores segmentations as polygon lists, uncompressed RLE objects,
/// or compressed-string RLE objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Segmentation {
    Polygons(Vec<Vec<f64>>),
    Rle(RleJson),
}

#[derive(Debug, Deserialize)]
struct RleJson {
    size: [u32; 2],
    counts: RleCounts,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RleCounts {
    Raw(Vec<u32>),
    Encoded(String),
}

/// Number of categories declared by the train subset's annotation file.
/// Used to derive `num_classes` before constructing a configuration.
pub fn category_count(dataset_dir: &Path) -> DatasetResult<usize> {
    let json_path = dataset_dir
        .join(Subset::Train.dir_name())
        .join("instances.json");
    let raw = fs::read(&json_path).map_err(|e| DatasetError::Io {
        path: json_path.clone(),
        source: e,
    })?;
    let coco: CocoJson = serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
        path: json_path,
        source: e,
    })?;
    Ok(coco.categories.len())
}

/// Load a COCO subset. With `class_filter`, only the given category ids are
/// registered and only images carrying at least one of them are kept.
pub fn load_coco(
    dataset_dir: &Path,
    subset: Subset,
    class_filter: Option<&[i64]>,
) -> DatasetResult<Dataset> {
    let image_dir = dataset_dir.join(subset.dir_name());
    let json_path = image_dir.join("instances.json");
    let raw = fs::read(&json_path).map_err(|e| DatasetError::Io {
        path: json_path.clone(),
        source: e,
    })?;
    let coco: CocoJson = serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
        path: json_path.clone(),
        source: e,
    })?;

    let mut cat_ids: Vec<i64> = match class_filter {
        Some(ids) => ids.to_vec(),
        None => coco.categories.iter().map(|c| c.id).collect(),
    };
    cat_ids.sort_unstable();
    cat_ids.dedup();

    let mut classes = ClassMap::new();
    for &id in &cat_ids {
        let name = coco
            .categories
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.as_str())
            .ok_or_else(|| DatasetError::Annotation {
                path: json_path.clone(),
                msg: format!("category id {id} not declared"),
            })?;
        classes.add_class(COCO_SOURCE, id, name);
    }
    classes.prepare();

    // Group annotations by image, keeping only requested categories.
    let wanted: BTreeSet<i64> = cat_ids.iter().copied().collect();
    let mut by_image: BTreeMap<i64, Vec<&CocoAnnotation>> = BTreeMap::new();
    for ann in &coco.annotations {
        if wanted.contains(&ann.category_id) {
            by_image.entry(ann.image_id).or_default().push(ann);
        }
    }

    let mut images = Vec::new();
    for img in &coco.images {
        let anns = match by_image.get(&img.id) {
            Some(anns) => anns.as_slice(),
            None => {
                if class_filter.is_some() {
                    // Filtered loads keep only images that carry the classes.
                    continue;
                }
                &[]
            }
        };

        let mut instances = Vec::new();
        for ann in anns {
            let Some(internal) = classes.from_source(COCO_SOURCE, ann.category_id) else {
                continue;
            };
            let mask = ann_to_mask(ann, img.width, img.height, &json_path)?;
            // Sub-pixel regions rasterize to nothing; skip them.
            if mask.is_empty() {
                continue;
            }
            let class_id = if ann.iscrowd != 0 { -internal } else { internal };
            instances.push(InstanceAnn { class_id, mask });
        }

        images.push(ImageRecord {
            id: img.id,
            path: image_dir.join(&img.file_name),
            width: img.width,
            height: img.height,
            instances,
        });
    }
    images.sort_by_key(|r| r.id);

    log::info!(
        "loaded coco subset {} ({} images, {} classes)",
        subset.dir_name(),
        images.len(),
        classes.num_classes()
    );
    Ok(Dataset { classes, images })
}

/// Synthesize the binary mask for one annotation: polygon parts are
/// rasterized and merged; RLE objects are decoded in either form.
fn ann_to_mask(
    ann: &CocoAnnotation,
    width: u32,
    height: u32,
    json_path: &Path,
) -> DatasetResult<InstanceMask> {
    let Some(segmentation) = &ann.segmentation else {
        return Ok(InstanceMask::new(width, height));
    };
    match segmentation {
        Segmentation::Polygons(parts) => {
            let mut masks = Vec::with_capacity(parts.len());
            for part in parts {
                let xs: Vec<f64> = part.iter().copied().step_by(2).collect();
                let ys: Vec<f64> = part.iter().copied().skip(1).step_by(2).collect();
                masks.push(fill_polygon(&xs, &ys, width, height));
            }
            Ok(merge(&masks, width, height))
        }
        Segmentation::Rle(rle_json) => {
            let [h, w] = rle_json.size;
            let rle = match &rle_json.counts {
                RleCounts::Raw(counts) => Rle {
                    height: h,
                    width: w,
                    counts: counts.clone(),
                },
                RleCounts::Encoded(s) => {
                    Rle::from_string_encoded(h, w, s).map_err(|e| DatasetError::Rle {
                        path: json_path.to_path_buf(),
                        source: e,
                    })?
                }
            };
            rle.to_mask().map_err(|e| DatasetError::Rle {
                path: json_path.to_path_buf(),
                source: e,
            })
        }
    }
}
