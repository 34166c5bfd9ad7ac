//! Detector configuration presets for the two datasets.

/// Hyperparameters shared by training and inference. Mirrors the knobs the
/// CLI tools expose; everything else is derived.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Recognizable configuration name; also names log directories.
    pub name: String,
    pub gpu_count: usize,
    /// Images per device; effective batch is `gpu_count * images_per_gpu`.
    pub images_per_gpu: usize,
    /// Number of classes including background.
    pub num_classes: usize,
    /// Training steps (batches) per epoch.
    pub steps_per_epoch: usize,
    /// Detections below this confidence are dropped.
    pub detection_min_confidence: f32,
    /// IoU threshold for non-max suppression at detection time.
    pub detection_nms_threshold: f32,
    pub learning_rate: f32,
    /// Cap on ground-truth instances used per image.
    pub max_gt_instances: usize,
    /// Square input resolution fed to the transform pipeline.
    pub target_size: (u32, u32),
}

impl NetConfig {
    pub fn batch_size(&self) -> usize {
        (self.gpu_count * self.images_per_gpu).max(1)
    }

    /// COCO training preset; `num_classes` comes from the annotation file.
    pub fn coco(num_classes: usize) -> Self {
        Self {
            name: "coco".to_string(),
            gpu_count: 1,
            images_per_gpu: 1,
            num_classes,
            steps_per_epoch: 1000,
            detection_min_confidence: 0.7,
            detection_nms_threshold: 0.95,
            learning_rate: 1e-3,
            max_gt_instances: 10,
            target_size: (512, 512),
        }
    }

    /// Zuppa product-dataset training preset (background + five products).
    pub fn zuppa() -> Self {
        Self {
            name: "zuppa".to_string(),
            gpu_count: 1,
            images_per_gpu: 2,
            num_classes: 1 + 5,
            steps_per_epoch: 400,
            detection_min_confidence: 0.9,
            detection_nms_threshold: 0.5,
            learning_rate: 1e-3,
            max_gt_instances: 16,
            target_size: (512, 512),
        }
    }

    /// Inference variant: one image at a time.
    pub fn inference(mut self) -> Self {
        self.gpu_count = 1;
        self.images_per_gpu = 1;
        self
    }

    /// Print the configuration table.
    pub fn display(&self) {
        println!("Configurations:");
        println!("{:<28}{}", "NAME", self.name);
        println!("{:<28}{}", "GPU_COUNT", self.gpu_count);
        println!("{:<28}{}", "IMAGES_PER_GPU", self.images_per_gpu);
        println!("{:<28}{}", "BATCH_SIZE", self.batch_size());
        println!("{:<28}{}", "NUM_CLASSES", self.num_classes);
        println!("{:<28}{}", "STEPS_PER_EPOCH", self.steps_per_epoch);
        println!(
            "{:<28}{}",
            "DETECTION_MIN_CONFIDENCE", self.detection_min_confidence
        );
        println!(
            "{:<28}{}",
            "DETECTION_NMS_THRESHOLD", self.detection_nms_threshold
        );
        println!("{:<28}{}", "LEARNING_RATE", self.learning_rate);
        println!("{:<28}{}", "MAX_GT_INSTANCES", self.max_gt_instances);
        println!(
            "{:<28}{}x{}",
            "TARGET_SIZE", self.target_size.0, self.target_size.1
        );
        println!();
    }
}

/// One entry of a staged fine-tuning schedule. `epochs` is the absolute
/// epoch index to train up to, so later stages resume where earlier ones
/// stopped.
#[derive(Debug, Clone)]
pub struct TrainingStage {
    /// Which layers the stage targets ("heads", "4+", "all"); recorded in
    /// the training log.
    pub layers: &'static str,
    /// Multiplier applied to the base learning rate.
    pub lr_scale: f32,
    /// Train until this (cumulative) epoch count.
    pub epochs: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_size_is_the_product() {
        let mut cfg = NetConfig::zuppa();
        assert_eq!(cfg.batch_size(), 2);
        cfg = cfg.inference();
        assert_eq!(cfg.batch_size(), 1);
    }

    #[test]
    fn presets_carry_dataset_hyperparameters() {
        let coco = NetConfig::coco(81);
        assert_eq!(coco.steps_per_epoch, 1000);
        assert_eq!(coco.max_gt_instances, 10);
        let zuppa = NetConfig::zuppa();
        assert_eq!(zuppa.num_classes, 6);
        assert!((zuppa.detection_min_confidence - 0.9).abs() < f32::EPSILON);
    }
}
