//! VIA polygon dataset adapter: `<root>/<subset>/via_region_data.json` as
//! exported by the VGG Image Annotator, images alongside the JSON.

use crate::types::{
    ClassMap, Dataset, DatasetError, DatasetResult, ImageRecord, InstanceAnn, Subset,
};
use mask_core::mask::fill_polygon;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

pub const ZUPPA_SOURCE: &str = "zuppa";

/// Product classes recognized in `region_attributes.products`.
pub const PRODUCT_CLASSES: &[(&str, i64)] = &[
    ("Sour", 1),
    ("Tiger", 2),
    ("Lychee", 3),
    ("Tea", 4),
    ("Milo", 5),
];

#[derive(Debug, Deserialize)]
struct ViaImage {
    filename: String,
    #[serde(default)]
    regions: ViaRegions,
}

/// VIA exports regions either as an object keyed by index or as a plain list,
/// depending on tool version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ViaRegions {
    Map(BTreeMap<String, ViaRegion>),
    List(Vec<ViaRegion>),
}

impl Default for ViaRegions {
    fn default() -> Self {
        ViaRegions::List(Vec::new())
    }
}

impl ViaRegions {
    fn iter(&self) -> Box<dyn Iterator<Item = &ViaRegion> + '_> {
        match self {
            ViaRegions::Map(map) => Box::new(map.values()),
            ViaRegions::List(list) => Box::new(list.iter()),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            ViaRegions::Map(map) => map.is_empty(),
            ViaRegions::List(list) => list.is_empty(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ViaRegion {
    shape_attributes: ViaShape,
    #[serde(default)]
    region_attributes: ViaAttributes,
}

#[derive(Debug, Deserialize)]
struct ViaShape {
    #[serde(default)]
    all_points_x: Vec<f64>,
    #[serde(default)]
    all_points_y: Vec<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ViaAttributes {
    #[serde(default)]
    products: Option<String>,
}

fn product_class_id(name: &str) -> Option<i64> {
    PRODUCT_CLASSES
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, id)| *id)
}

/// Load a VIA subset. Images without regions are skipped; regions whose
/// product label is unknown or missing are dropped. VIA JSON carries no
/// image dimensions, so each image file is probed for its size.
pub fn load_via(dataset_dir: &Path, subset: Subset) -> DatasetResult<Dataset> {
    let subset_dir = dataset_dir.join(subset.dir_name());
    let json_path = subset_dir.join("via_region_data.json");
    let raw = fs::read(&json_path).map_err(|e| DatasetError::Io {
        path: json_path.clone(),
        source: e,
    })?;
    let entries: BTreeMap<String, ViaImage> =
        serde_json::from_slice(&raw).map_err(|e| DatasetError::Json {
            path: json_path.clone(),
            source: e,
        })?;

    let mut classes = ClassMap::new();
    for (name, id) in PRODUCT_CLASSES {
        classes.add_class(ZUPPA_SOURCE, *id, name);
    }
    classes.prepare();

    let mut annotated: Vec<&ViaImage> = entries
        .values()
        .filter(|img| !img.regions.is_empty())
        .collect();
    annotated.sort_by(|a, b| a.filename.cmp(&b.filename));

    let mut images = Vec::new();
    for (idx, via_img) in annotated.iter().enumerate() {
        let image_path = subset_dir.join(&via_img.filename);
        let (width, height) =
            image::image_dimensions(&image_path).map_err(|e| DatasetError::Image {
                path: image_path.clone(),
                source: e,
            })?;

        let mut instances = Vec::new();
        for region in via_img.regions.iter() {
            let product = match region.region_attributes.products.as_deref() {
                Some(p) => p,
                None => {
                    log::warn!("{}: region without product label dropped", via_img.filename);
                    continue;
                }
            };
            let Some(source_id) = product_class_id(product) else {
                log::warn!(
                    "{}: unknown product label {product:?} dropped",
                    via_img.filename
                );
                continue;
            };
            let class_id = classes
                .from_source(ZUPPA_SOURCE, source_id)
                .expect("product classes are registered above");

            let shape = &region.shape_attributes;
            let mask = fill_polygon(&shape.all_points_x, &shape.all_points_y, width, height);
            if mask.is_empty() {
                continue;
            }
            instances.push(InstanceAnn { class_id, mask });
        }

        images.push(ImageRecord {
            id: idx as i64,
            path: image_path,
            width,
            height,
            instances,
        });
    }

    log::info!(
        "loaded zuppa subset {} ({} annotated images)",
        subset.dir_name(),
        images.len()
    );
    Ok(Dataset { classes, images })
}
