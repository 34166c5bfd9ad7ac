//! Checkpoint lifecycle: save, find_last, resolve, reload.

use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use detector::{
    find_last, load_detector, resolve_weights, CheckpointDir, NetConfig, SegHead, SegHeadConfig,
    TrainBackend, FEATURE_DIM,
};
use std::fs;
use std::path::PathBuf;

fn fixed_input(device: &<TrainBackend as Backend>::Device) -> Tensor<TrainBackend, 2> {
    let features: Vec<f32> = (0..FEATURE_DIM).map(|i| i as f32 / FEATURE_DIM as f32).collect();
    Tensor::from_data(TensorData::new(features, [1, FEATURE_DIM]), device)
}

#[test]
fn saved_checkpoint_reloads_with_identical_outputs() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let cfg = NetConfig {
        num_classes: 3,
        max_gt_instances: 4,
        ..NetConfig::zuppa()
    };
    let device = <TrainBackend as Backend>::Device::default();
    let model = SegHead::<TrainBackend>::new(SegHeadConfig::from_net(&cfg), &device);

    let ckpts = CheckpointDir::create(tmp.path(), &cfg.name)?;
    let path = ckpts.save(&model, 0)?;
    assert!(path.exists());

    let found = find_last(tmp.path())?;
    assert_eq!(found, path);

    let loaded = load_detector(&cfg, Some(&found), &device);
    let (b1, s1, c1) = model.forward_detect(fixed_input(&device));
    let (b2, s2, c2) = loaded.forward_detect(fixed_input(&device));

    let close = |a: Vec<f32>, b: Vec<f32>| {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x - y).abs() < 1e-6);
        }
    };
    close(
        b1.into_data().to_vec().unwrap(),
        b2.into_data().to_vec().unwrap(),
    );
    close(
        s1.into_data().to_vec().unwrap(),
        s2.into_data().to_vec().unwrap(),
    );
    close(
        c1.into_data().to_vec().unwrap(),
        c2.into_data().to_vec().unwrap(),
    );
    Ok(())
}

#[test]
fn find_last_picks_newest_epoch_of_newest_run() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let old_run = tmp.path().join("zuppa20230101T000000");
    let new_run = tmp.path().join("zuppa20240101T000000");
    fs::create_dir_all(&old_run)?;
    fs::create_dir_all(&new_run)?;
    fs::write(old_run.join("detector_zuppa_0009.bin"), b"old")?;
    fs::write(new_run.join("detector_zuppa_0000.bin"), b"new0")?;
    fs::write(new_run.join("detector_zuppa_0003.bin"), b"new3")?;

    let found = find_last(tmp.path())?;
    assert_eq!(found, new_run.join("detector_zuppa_0003.bin"));
    Ok(())
}

#[test]
fn find_last_errors_when_no_checkpoints_exist() {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join("empty_run")).unwrap();
    let err = find_last(tmp.path()).unwrap_err();
    assert!(err.to_string().contains("could not find weight files"));
}

#[test]
fn weight_keywords_resolve() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let run = tmp.path().join("coco20240101T000000");
    fs::create_dir_all(&run)?;
    let ckpt = run.join("detector_coco_0001.bin");
    fs::write(&ckpt, b"x")?;

    assert_eq!(resolve_weights("last", tmp.path())?, ckpt);
    assert_eq!(
        resolve_weights("coco", tmp.path())?,
        PathBuf::from("checkpoints/detector_coco.bin")
    );
    assert_eq!(
        resolve_weights("/some/explicit.bin", tmp.path())?,
        PathBuf::from("/some/explicit.bin")
    );
    Ok(())
}

#[test]
fn missing_weights_fall_back_to_fresh_model() {
    let cfg = NetConfig::zuppa();
    let device = <TrainBackend as Backend>::Device::default();
    // Does not panic; produces a usable model.
    let model = load_detector(&cfg, Some(std::path::Path::new("/does/not/exist.bin")), &device);
    let (_b, s, _c) = model.forward_detect(fixed_input(&device));
    assert_eq!(s.dims()[0], 1);
}
