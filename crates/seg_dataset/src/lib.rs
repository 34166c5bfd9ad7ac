//! Dataset adapters and training-sample preparation for ShelfScan.
//!
//! This crate provides:
//! - COCO JSON loading (`instances.json` per subset) with mask synthesis
//! - VIA polygon-region JSON loading for the zuppa product dataset
//! - A source↔internal class-id map
//! - The image+box augmentation/transform pipeline
//! - COCO results formatting for evaluation output

pub mod aug;
pub mod coco;
pub mod results;
pub mod types;
pub mod via;

pub use aug::{DatasetSample, ResizeMode, TransformConfig, TransformPipeline};
pub use coco::{category_count, load_coco, COCO_SOURCE};
pub use results::{build_coco_results, write_results, CocoResult, RleSegmentation};
pub use types::*;
pub use via::{load_via, PRODUCT_CLASSES, ZUPPA_SOURCE};
