//! mask_core: shared instance-mask representation and pixel-level operations.
//!
//! This crate provides:
//! - A binary per-instance mask type with polygon rasterization
//! - COCO-style run-length encoding (uncompressed counts and the compressed
//!   ASCII string form)
//! - The color-splash compositing effect
//! - The detector/detection interfaces shared by the dataset and model crates

pub mod interfaces;
pub mod mask;
pub mod rle;
pub mod splash;

pub mod prelude {
    pub use crate::interfaces::{Detection, Detector, Frame};
    pub use crate::mask::{fill_polygon, merge, InstanceMask};
    pub use crate::rle::{Rle, RleError};
    pub use crate::splash::color_splash;
}
