//! End-to-end training smoke test on a tiny synthetic dataset.

use detector::{fit, BurnDetector, CheckpointDir, NetConfig, TrainingStage};
use mask_core::interfaces::{Detector, Frame};
use mask_core::mask::InstanceMask;
use seg_dataset::{
    ClassMap, Dataset, ImageRecord, InstanceAnn, ResizeMode, TransformConfig, TransformPipeline,
};
use std::path::Path;

fn synthetic_dataset(root: &Path, count: usize) -> anyhow::Result<Dataset> {
    let mut classes = ClassMap::new();
    classes.add_class("smoke", 1, "widget");
    classes.prepare();

    let mut images = Vec::new();
    for i in 0..count {
        let name = format!("frame_{i:03}.png");
        let path = root.join(&name);
        let img = image::RgbImage::from_pixel(16, 16, image::Rgb([(i * 40) as u8, 120, 200]));
        img.save(&path)?;

        let mut mask = InstanceMask::new(16, 16);
        mask.fill_rect(2 + i as u32, 2, 10 + i as u32, 10);
        images.push(ImageRecord {
            id: i as i64,
            path,
            width: 16,
            height: 16,
            instances: vec![InstanceAnn { class_id: 1, mask }],
        });
    }
    Ok(Dataset { classes, images })
}

#[test]
fn one_epoch_trains_and_checkpoints() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let data_dir = tmp.path().join("data");
    std::fs::create_dir_all(&data_dir)?;
    let train_set = synthetic_dataset(&data_dir, 3)?;
    let val_set = synthetic_dataset(&data_dir, 2)?;

    let cfg = NetConfig {
        name: "smoke".to_string(),
        images_per_gpu: 2,
        num_classes: 2,
        steps_per_epoch: 2,
        max_gt_instances: 4,
        target_size: (16, 16),
        ..NetConfig::zuppa()
    };

    let pipeline = TransformPipeline::new(TransformConfig {
        target_size: Some((16, 16)),
        resize_mode: ResizeMode::Force,
        flip_horizontal_prob: 0.5,
        max_instances: 4,
        seed: Some(3),
        ..TransformConfig::default()
    });

    let logs = tmp.path().join("logs");
    std::fs::create_dir_all(&logs)?;
    let ckpts = CheckpointDir::create(&logs, &cfg.name)?;
    let stages = [TrainingStage {
        layers: "heads",
        lr_scale: 1.0,
        epochs: 1,
    }];

    let report = fit(&cfg, &stages, &train_set, &val_set, &pipeline, &ckpts, None)?;
    assert_eq!(report.epochs_run, 1);
    assert!(report.final_train_loss.is_finite());
    assert!(report.final_val_loss.is_finite());
    let ckpt = report.last_checkpoint.expect("checkpoint written");
    assert!(ckpt.exists());

    // The written checkpoint drives inference end to end.
    let mut det = BurnDetector::from_weights(cfg.inference(), Some(&ckpt));
    let frame = Frame::new(0, image::RgbImage::from_pixel(16, 16, image::Rgb([90, 90, 90])));
    let detection = det.detect(&frame);
    assert_eq!(detection.boxes.len(), detection.scores.len());
    assert_eq!(detection.boxes.len(), detection.masks.len());
    assert_eq!(detection.boxes.len(), detection.class_ids.len());
    Ok(())
}

#[test]
fn empty_training_set_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut classes = ClassMap::new();
    classes.add_class("smoke", 1, "widget");
    classes.prepare();
    let empty = Dataset {
        classes,
        images: Vec::new(),
    };

    let cfg = NetConfig {
        name: "smoke".to_string(),
        ..NetConfig::zuppa()
    };
    let pipeline = TransformPipeline::new(TransformConfig::default());
    let ckpts = CheckpointDir::create(tmp.path(), "smoke").unwrap();
    let err = fit(
        &cfg,
        &[TrainingStage {
            layers: "heads",
            lr_scale: 1.0,
            epochs: 1,
        }],
        &empty,
        &empty.clone(),
        &pipeline,
        &ckpts,
        None,
    )
    .unwrap_err();
    assert!(err.to_string().contains("training set is empty"));
}
