#![recursion_limit = "256"]

//! The model boundary for ShelfScan: a Burn-backed detection head with
//! checkpointing, a training loop, and a `Detector` implementation.
//!
//! The heavyweight backbone is deliberately out of scope; this crate keeps
//! the train/evaluate/detect entry points and the checkpoint lifecycle that
//! the CLI tools orchestrate.

pub mod checkpoint;
pub mod config;
pub mod infer;
pub mod model;
pub mod train;

pub use checkpoint::{find_last, resolve_weights, CheckpointDir};
pub use config::{NetConfig, TrainingStage};
pub use infer::{load_detector, load_head, BurnDetector};
pub use model::{image_features, SegHead, SegHeadConfig, FEATURE_DIM};
pub use train::{fit, FitReport};

/// Backend alias for training/eval (NdArray by default; WGPU if enabled).
#[cfg(feature = "backend-wgpu")]
pub type TrainBackend = burn_wgpu::Wgpu<f32>;
#[cfg(not(feature = "backend-wgpu"))]
pub type TrainBackend = burn_ndarray::NdArray<f32>;
