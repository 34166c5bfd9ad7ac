//! Core types, error definitions, and the class-id map for seg_dataset.

use mask_core::mask::InstanceMask;
use mask_core::rle::RleError;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

pub type DatasetResult<T> = Result<T, DatasetError>;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json parse error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("image error at {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("annotation error at {path}: {msg}")]
    Annotation { path: PathBuf, msg: String },
    #[error("rle error at {path}: {source}")]
    Rle {
        path: PathBuf,
        #[source]
        source: RleError,
    },
}

/// Dataset subset on disk (`<root>/train`, `<root>/val`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subset {
    Train,
    Val,
}

impl Subset {
    pub fn dir_name(&self) -> &'static str {
        match self {
            Subset::Train => "train",
            Subset::Val => "val",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassInfo {
    /// Annotation source tag ("coco", "zuppa"); background uses "".
    pub source: String,
    /// Class id in the source annotation format.
    pub source_id: i64,
    pub name: String,
}

/// Maps source class ids to contiguous internal ids with background at 0,
/// and back again for results formatting.
#[derive(Debug, Clone)]
pub struct ClassMap {
    classes: Vec<ClassInfo>,
    by_source: HashMap<String, i32>,
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassMap {
    pub fn new() -> Self {
        Self {
            classes: vec![ClassInfo {
                source: String::new(),
                source_id: 0,
                name: "BG".to_string(),
            }],
            by_source: HashMap::new(),
        }
    }

    /// Register a class; duplicate (source, id) pairs are ignored.
    pub fn add_class(&mut self, source: &str, source_id: i64, name: &str) {
        if self
            .classes
            .iter()
            .any(|c| c.source == source && c.source_id == source_id)
        {
            return;
        }
        self.classes.push(ClassInfo {
            source: source.to_string(),
            source_id,
            name: name.to_string(),
        });
    }

    /// Finalize internal ids (index order, background first) and build the
    /// source lookup. Must be called after the last `add_class`.
    pub fn prepare(&mut self) {
        self.by_source = self
            .classes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(i, c)| (Self::key(&c.source, c.source_id), i as i32))
            .collect();
    }

    fn key(source: &str, source_id: i64) -> String {
        format!("{source}.{source_id}")
    }

    /// Including background.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn from_source(&self, source: &str, source_id: i64) -> Option<i32> {
        self.by_source.get(&Self::key(source, source_id)).copied()
    }

    /// Source class id for a (non-negative) internal id.
    pub fn to_source(&self, internal: i32) -> Option<i64> {
        self.classes.get(internal as usize).map(|c| c.source_id)
    }

    pub fn name(&self, internal: i32) -> Option<&str> {
        self.classes.get(internal as usize).map(|c| c.name.as_str())
    }
}

/// One annotated instance: internal class id (negative for crowd regions)
/// plus its binary mask at image resolution.
#[derive(Debug, Clone)]
pub struct InstanceAnn {
    pub class_id: i32,
    pub mask: InstanceMask,
}

/// One image with its annotated instances.
#[derive(Debug, Clone)]
pub struct ImageRecord {
    pub id: i64,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub instances: Vec<InstanceAnn>,
}

/// A loaded dataset subset: class registry plus image records.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub classes: ClassMap,
    pub images: Vec<ImageRecord>,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_map_roundtrips_source_ids() {
        let mut map = ClassMap::new();
        map.add_class("coco", 7, "truck");
        map.add_class("coco", 21, "cow");
        map.add_class("coco", 7, "truck"); // duplicate ignored
        map.prepare();

        assert_eq!(map.num_classes(), 3);
        assert_eq!(map.from_source("coco", 7), Some(1));
        assert_eq!(map.from_source("coco", 21), Some(2));
        assert_eq!(map.to_source(2), Some(21));
        assert_eq!(map.name(0), Some("BG"));
        assert_eq!(map.from_source("coco", 99), None);
    }
}
