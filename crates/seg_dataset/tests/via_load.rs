//! VIA adapter integration tests over synthetic exports.

use seg_dataset::{load_via, Subset};
use serde_json::json;
use std::fs;

fn square_region(product: &str) -> serde_json::Value {
    json!({
        "shape_attributes": {
            "name": "polygon",
            "all_points_x": [1.0, 6.0, 6.0, 1.0],
            "all_points_y": [1.0, 1.0, 6.0, 6.0]
        },
        "region_attributes": {"products": product}
    })
}

#[test]
fn loads_both_region_shapes_and_drops_unknown_products() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let train = tmp.path().join("train");
    fs::create_dir_all(&train)?;

    // The images must exist on disk: VIA JSON has no dimensions.
    for name in ["a.png", "b.png", "c.png"] {
        image::RgbImage::new(8, 8).save(train.join(name))?;
    }

    let body = json!({
        // Dict-style regions (older VIA exports).
        "a.png1234": {
            "filename": "a.png",
            "regions": {
                "0": square_region("Tea"),
                "1": square_region("NotAProduct"),
                "2": {
                    "shape_attributes": {
                        "all_points_x": [2.0, 4.0, 4.0, 2.0],
                        "all_points_y": [2.0, 2.0, 4.0, 4.0]
                    },
                    "region_attributes": {}
                }
            }
        },
        // List-style regions (newer VIA exports).
        "b.png99": {
            "filename": "b.png",
            "regions": [square_region("Milo")]
        },
        // Unannotated images are skipped entirely.
        "c.png5": {
            "filename": "c.png",
            "regions": []
        }
    });
    fs::write(train.join("via_region_data.json"), serde_json::to_vec(&body)?)?;

    let dataset = load_via(tmp.path(), Subset::Train)?;
    // BG + five product classes.
    assert_eq!(dataset.classes.num_classes(), 6);
    assert_eq!(dataset.classes.name(4), Some("Tea"));

    assert_eq!(dataset.images.len(), 2);
    let a = &dataset.images[0];
    assert!(a.path.ends_with("a.png"));
    assert_eq!((a.width, a.height), (8, 8));
    // Unknown product and missing label were dropped; only Tea remains.
    assert_eq!(a.instances.len(), 1);
    assert_eq!(a.instances[0].class_id, 4);
    assert_eq!(a.instances[0].mask.area(), 25);

    let b = &dataset.images[1];
    assert_eq!(b.instances.len(), 1);
    assert_eq!(b.instances[0].class_id, 5);
    Ok(())
}

#[test]
fn missing_export_is_an_io_error() {
    let tmp = tempfile::tempdir().unwrap();
    let err = load_via(tmp.path(), Subset::Val).unwrap_err();
    assert!(err.to_string().contains("io error"));
}
