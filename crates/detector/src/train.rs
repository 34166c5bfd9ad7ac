//! Training loop: staged schedule, greedy target assignment, Adam updates,
//! per-epoch validation loss and checkpoints.

use burn::backend::Autodiff;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::tensor::activation::log_softmax;
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use rand::seq::SliceRandom;
use std::path::PathBuf;

use seg_dataset::{Dataset, DatasetSample, ImageRecord, TransformPipeline};

use crate::checkpoint::CheckpointDir;
use crate::config::{NetConfig, TrainingStage};
use crate::infer::iou_xyxy;
use crate::model::{image_features, SegHead};
use crate::TrainBackend;

type ADBackend = Autodiff<TrainBackend>;

#[derive(Debug, Clone)]
pub struct FitReport {
    pub epochs_run: usize,
    pub final_train_loss: f32,
    pub final_val_loss: f32,
    pub last_checkpoint: Option<PathBuf>,
}

/// Ground truth for one batch, kept host-side for target assignment.
struct CollatedBatch<B: Backend> {
    features: Tensor<B, 2>,
    gt_boxes: Vec<f32>,
    gt_mask: Vec<f32>,
    gt_classes: Vec<i32>,
    max_gt: usize,
}

fn load_sample(
    record: &ImageRecord,
    pipeline: &TransformPipeline,
) -> anyhow::Result<DatasetSample> {
    let img = image::open(&record.path)
        .map_err(|e| anyhow::anyhow!("failed to open image {}: {e}", record.path.display()))?
        .to_rgb8();
    Ok(pipeline.apply(img, record))
}

fn collate<B: Backend>(
    samples: &[DatasetSample],
    max_gt: usize,
    device: &B::Device,
) -> CollatedBatch<B> {
    let batch = samples.len();
    let max_gt = max_gt.max(1);
    let mut features = Vec::with_capacity(batch * crate::model::FEATURE_DIM);
    let mut gt_boxes = vec![0.0f32; batch * max_gt * 4];
    let mut gt_mask = vec![0.0f32; batch * max_gt];
    let mut gt_classes = vec![0i32; batch * max_gt];

    for (b, sample) in samples.iter().enumerate() {
        features.extend_from_slice(&image_features(
            &sample.image_chw,
            sample.width,
            sample.height,
        ));
        for (g, bbox) in sample.boxes.iter().take(max_gt).enumerate() {
            let base = (b * max_gt + g) * 4;
            gt_boxes[base..base + 4].copy_from_slice(bbox);
            gt_mask[b * max_gt + g] = 1.0;
            gt_classes[b * max_gt + g] = sample.class_ids.get(g).copied().unwrap_or(0);
        }
    }

    let features = Tensor::<B, 2>::from_data(
        TensorData::new(features, [batch, crate::model::FEATURE_DIM]),
        device,
    );
    CollatedBatch {
        features,
        gt_boxes,
        gt_mask,
        gt_classes,
        max_gt,
    }
}

struct Targets<B: Backend> {
    obj: Tensor<B, 2>,
    boxes: Tensor<B, 3>,
    box_weights: Tensor<B, 3>,
    class_onehot: Tensor<B, 3>,
    matched: f32,
}

/// Greedy matching per ground-truth box: each GT picks its best prediction
/// by IoU; that slot becomes a positive with the GT's box and class.
fn build_greedy_targets<B: Backend>(
    pred_boxes: &Tensor<B, 3>,
    gt: &CollatedBatch<B>,
    num_classes: usize,
) -> Targets<B> {
    let batch = pred_boxes.dims()[0];
    let max_pred = pred_boxes.dims()[1];
    let max_gt = gt.max_gt;

    let pred_vec = pred_boxes
        .clone()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default();

    let mut obj = vec![0.0f32; batch * max_pred];
    let mut boxes = vec![0.0f32; batch * max_pred * 4];
    let mut box_weights = vec![0.0f32; batch * max_pred * 4];
    let mut class_onehot = vec![0.0f32; batch * max_pred * num_classes];
    let mut matched = 0.0f32;

    for b in 0..batch {
        for g in 0..max_gt {
            if gt.gt_mask[b * max_gt + g] < 0.5 {
                continue;
            }
            let base = (b * max_gt + g) * 4;
            let gb = [
                gt.gt_boxes[base],
                gt.gt_boxes[base + 1],
                gt.gt_boxes[base + 2],
                gt.gt_boxes[base + 3],
            ];

            let mut best_iou = -1.0f32;
            let mut best_p = 0usize;
            for p in 0..max_pred {
                let pb_base = (b * max_pred + p) * 4;
                let pb = [
                    pred_vec[pb_base],
                    pred_vec[pb_base + 1],
                    pred_vec[pb_base + 2],
                    pred_vec[pb_base + 3],
                ];
                let iou = iou_xyxy(pb, gb);
                if iou > best_iou {
                    best_iou = iou;
                    best_p = p;
                }
            }

            let slot = b * max_pred + best_p;
            obj[slot] = 1.0;
            boxes[slot * 4..slot * 4 + 4].copy_from_slice(&gb);
            box_weights[slot * 4..slot * 4 + 4].copy_from_slice(&[1.0; 4]);
            matched += 1.0;

            let class = gt.gt_classes[b * max_gt + g];
            if class > 0 && (class as usize) < num_classes {
                class_onehot[slot * num_classes + class as usize] = 1.0;
            }
        }
    }

    let device = &pred_boxes.device();
    Targets {
        obj: Tensor::<B, 2>::from_data(TensorData::new(obj, [batch, max_pred]), device),
        boxes: Tensor::<B, 3>::from_data(TensorData::new(boxes, [batch, max_pred, 4]), device),
        box_weights: Tensor::<B, 3>::from_data(
            TensorData::new(box_weights, [batch, max_pred, 4]),
            device,
        ),
        class_onehot: Tensor::<B, 3>::from_data(
            TensorData::new(class_onehot, [batch, max_pred, num_classes]),
            device,
        ),
        matched,
    }
}

/// Combined loss: objectness BCE + matched-box L1 + class cross-entropy.
fn detection_loss<B: Backend>(
    model: &SegHead<B>,
    batch: &CollatedBatch<B>,
) -> Tensor<B, 1> {
    let (pred_boxes, pred_scores, class_logits) = model.forward_detect(batch.features.clone());
    let num_classes = model.num_classes();
    let targets = build_greedy_targets(&pred_boxes, batch, num_classes);

    let eps = 1e-6;
    let scores_clamped = pred_scores.clamp(eps, 1.0 - eps);
    let obj_inv = Tensor::<B, 2>::ones(targets.obj.dims(), &targets.obj.device())
        - targets.obj.clone();
    let ones = Tensor::<B, 2>::ones(scores_clamped.dims(), &scores_clamped.device());
    let obj_loss = -((targets.obj.clone() * scores_clamped.clone().log())
        + (obj_inv * (ones - scores_clamped).log()))
    .sum()
    .div_scalar((targets.obj.dims()[0] * targets.obj.dims()[1]) as f32);

    let matched = targets.matched.max(1.0);
    let box_loss = ((pred_boxes - targets.boxes).abs() * targets.box_weights)
        .sum()
        .div_scalar(matched);

    let class_loss = -(log_softmax(class_logits, 2) * targets.class_onehot)
        .sum()
        .div_scalar(matched);

    obj_loss + box_loss + class_loss
}

fn loss_scalar<B: Backend>(loss: &Tensor<B, 1>) -> f32 {
    loss.clone()
        .into_data()
        .to_vec::<f32>()
        .unwrap_or_default()
        .into_iter()
        .next()
        .unwrap_or(0.0)
}

/// Train through the staged schedule, writing one checkpoint per epoch.
/// Stage `epochs` values are cumulative targets, so later stages resume
/// where earlier ones stopped.
pub fn fit(
    cfg: &NetConfig,
    stages: &[TrainingStage],
    train_set: &Dataset,
    val_set: &Dataset,
    pipeline: &TransformPipeline,
    ckpts: &CheckpointDir,
    weights: Option<&std::path::Path>,
) -> anyhow::Result<FitReport> {
    if train_set.is_empty() {
        anyhow::bail!("training set is empty");
    }
    let eval_pipeline = TransformPipeline::new(pipeline.config().eval());

    let device = <ADBackend as Backend>::Device::default();
    let mut model = crate::infer::load_head::<ADBackend>(cfg, weights, &device);
    let mut optim = AdamConfig::new().init();

    let batch_size = cfg.batch_size();
    let max_gt = cfg.max_gt_instances;
    let mut rng = rand::rng();
    let mut order: Vec<usize> = (0..train_set.images.len()).collect();
    let mut cursor = order.len(); // force an initial shuffle

    let mut epoch = 0usize;
    let mut report = FitReport {
        epochs_run: 0,
        final_train_loss: 0.0,
        final_val_loss: 0.0,
        last_checkpoint: None,
    };

    for stage in stages {
        if stage.epochs <= epoch {
            continue;
        }
        let lr = (cfg.learning_rate * stage.lr_scale) as f64;
        println!(
            "Training {} until epoch {} (lr {:.6})",
            stage.layers, stage.epochs, lr
        );

        while epoch < stage.epochs {
            let mut losses = Vec::with_capacity(cfg.steps_per_epoch);
            for _ in 0..cfg.steps_per_epoch {
                let mut samples = Vec::with_capacity(batch_size);
                for _ in 0..batch_size {
                    if cursor >= order.len() {
                        order.shuffle(&mut rng);
                        cursor = 0;
                    }
                    let record = &train_set.images[order[cursor]];
                    cursor += 1;
                    samples.push(load_sample(record, pipeline)?);
                }

                let batch = collate::<ADBackend>(&samples, max_gt, &device);
                let loss = detection_loss(&model, &batch);
                let loss_detached = loss.clone().detach();
                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optim.step(lr, model, grads);
                losses.push(loss_scalar(&loss_detached));
            }

            let train_loss = if losses.is_empty() {
                0.0
            } else {
                losses.iter().sum::<f32>() / losses.len() as f32
            };
            let val_loss = validation_loss(&model, cfg, val_set, &eval_pipeline, &device)?;
            println!("epoch {epoch}: loss {train_loss:.4} val_loss {val_loss:.4}");

            let path = ckpts.save(&model, epoch)?;
            report.last_checkpoint = Some(path);
            report.final_train_loss = train_loss;
            report.final_val_loss = val_loss;
            epoch += 1;
            report.epochs_run = epoch;
        }
    }

    Ok(report)
}

fn validation_loss(
    model: &SegHead<ADBackend>,
    cfg: &NetConfig,
    val_set: &Dataset,
    pipeline: &TransformPipeline,
    device: &<ADBackend as Backend>::Device,
) -> anyhow::Result<f32> {
    if val_set.is_empty() {
        return Ok(0.0);
    }
    let mut losses = Vec::new();
    for chunk in val_set.images.chunks(cfg.batch_size()) {
        let mut samples = Vec::with_capacity(chunk.len());
        for record in chunk {
            samples.push(load_sample(record, pipeline)?);
        }
        let batch = collate::<ADBackend>(&samples, cfg.max_gt_instances, device);
        let loss = detection_loss(model, &batch);
        losses.push(loss_scalar(&loss));
    }
    Ok(if losses.is_empty() {
        0.0
    } else {
        losses.iter().sum::<f32>() / losses.len() as f32
    })
}
