//! Checkpoint directory layout and weight-path resolution.
//!
//! Each training run writes into `<logs>/<name><%Y%m%dT%H%M%S>/`, one
//! `detector_<name>_<epoch:04>.bin` file per epoch. `find_last` resolves
//! the newest checkpoint of the newest run.

use anyhow::Context;
use burn::module::Module;
use burn::record::{BinFileRecorder, FullPrecisionSettings};
use burn::tensor::backend::Backend;
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::SegHead;

/// Conventional local paths for the pretrained-weight keywords. Weights are
/// never downloaded; the files are expected to be provisioned out of band.
pub const COCO_WEIGHTS_PATH: &str = "checkpoints/detector_coco.bin";
pub const IMAGENET_WEIGHTS_PATH: &str = "checkpoints/detector_imagenet.bin";

/// A per-run checkpoint directory.
#[derive(Debug, Clone)]
pub struct CheckpointDir {
    run_dir: PathBuf,
    name: String,
}

impl CheckpointDir {
    /// Create `<logs>/<name><timestamp>/`.
    pub fn create(logs_dir: &Path, name: &str) -> anyhow::Result<Self> {
        let stamp = Local::now().format("%Y%m%dT%H%M%S");
        let run_dir = logs_dir.join(format!("{name}{stamp}"));
        fs::create_dir_all(&run_dir)
            .with_context(|| format!("failed to create log directory {}", run_dir.display()))?;
        Ok(Self {
            run_dir,
            name: name.to_string(),
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn epoch_path(&self, epoch: usize) -> PathBuf {
        self.run_dir
            .join(format!("detector_{}_{:04}.bin", self.name, epoch))
    }

    /// Write the model record for one epoch.
    pub fn save<B: Backend>(&self, model: &SegHead<B>, epoch: usize) -> anyhow::Result<PathBuf> {
        let path = self.epoch_path(epoch);
        let recorder = BinFileRecorder::<FullPrecisionSettings>::new();
        model
            .clone()
            .save_file(&path, &recorder)
            .map_err(|e| anyhow::anyhow!("failed to save checkpoint {}: {e}", path.display()))?;
        Ok(path)
    }
}

/// Newest checkpoint of the newest run under `logs_dir`. Run directories
/// embed their timestamp, so lexicographic order is chronological.
pub fn find_last(logs_dir: &Path) -> anyhow::Result<PathBuf> {
    let mut run_dirs: Vec<PathBuf> = fs::read_dir(logs_dir)
        .with_context(|| format!("failed to read log directory {}", logs_dir.display()))?
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    run_dirs.sort();

    for run_dir in run_dirs.iter().rev() {
        let mut checkpoints: Vec<PathBuf> = fs::read_dir(run_dir)
            .with_context(|| format!("failed to read run directory {}", run_dir.display()))?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("detector_") && n.ends_with(".bin"))
                    .unwrap_or(false)
            })
            .collect();
        checkpoints.sort();
        if let Some(last) = checkpoints.pop() {
            return Ok(last);
        }
    }
    anyhow::bail!(
        "could not find weight files under {}; train a model first",
        logs_dir.display()
    )
}

/// Resolve a `--weights`/`--model` argument: the keywords `last`, `coco`,
/// and `imagenet`, or a literal checkpoint path.
pub fn resolve_weights(spec: &str, logs_dir: &Path) -> anyhow::Result<PathBuf> {
    match spec.to_lowercase().as_str() {
        "last" => find_last(logs_dir),
        "coco" => Ok(PathBuf::from(COCO_WEIGHTS_PATH)),
        "imagenet" => Ok(PathBuf::from(IMAGENET_WEIGHTS_PATH)),
        _ => Ok(PathBuf::from(spec)),
    }
}
