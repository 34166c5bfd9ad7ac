//! Train or evaluate the detector on a COCO-style dataset.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use detector::{fit, resolve_weights, BurnDetector, CheckpointDir, NetConfig, TrainingStage};
use mask_core::interfaces::{Detector, Frame};
use seg_dataset::{
    build_coco_results, category_count, load_coco, write_results, ResizeMode, Subset,
    TransformConfig, TransformPipeline,
};
use shelfscan_tools::timestamped_name;

#[derive(Parser, Debug)]
#[command(name = "coco", about = "Train or evaluate the detector on a COCO-style dataset")]
struct Args {
    /// 'train' or 'evaluate'.
    command: String,
    /// Directory of the dataset (train/ and val/ subsets with instances.json).
    #[arg(long)]
    dataset: PathBuf,
    /// Path to a weights file, or one of 'coco', 'last', 'imagenet'.
    #[arg(long)]
    model: String,
    /// Logs and checkpoints directory.
    #[arg(long, default_value = "logs")]
    logs: PathBuf,
    /// Images to use for evaluation.
    #[arg(long, default_value_t = 500)]
    limit: usize,
    /// Parse, load, and report without running training or evaluation.
    #[arg(long)]
    no_run: bool,
    /// Stage 1: train the network heads.
    #[arg(long)]
    stage_1: bool,
    /// Stage 2: fine-tune the upper backbone stages.
    #[arg(long)]
    stage_2: bool,
    /// Stage 3: fine-tune all layers.
    #[arg(long)]
    stage_3: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("Command: {}", args.command);
    println!("Model: {}", args.model);
    println!("Dataset: {}", args.dataset.display());
    println!("Logs: {}", args.logs.display());

    // Background + however many categories the train annotations declare.
    let num_classes = 1 + category_count(&args.dataset)?;

    let config = if args.command == "train" {
        NetConfig::coco(num_classes)
    } else {
        let mut cfg = NetConfig::coco(num_classes).inference();
        // Evaluation keeps every detection; the scorer sweeps thresholds.
        cfg.detection_min_confidence = 0.0;
        cfg
    };
    config.display();

    fs::create_dir_all(&args.logs)?;
    let weights = resolve_weights(&args.model, &args.logs)?;
    println!("Loading weights {}", weights.display());

    match args.command.as_str() {
        "train" => train(&args, &config, &weights),
        "evaluate" => evaluate(&args, &config, &weights),
        other => anyhow::bail!("'{other}' is not recognized. Use 'train' or 'evaluate'"),
    }
}

fn train(args: &Args, config: &NetConfig, weights: &PathBuf) -> anyhow::Result<()> {
    let dataset_train = load_coco(&args.dataset, Subset::Train, None)?;
    let dataset_val = load_coco(&args.dataset, Subset::Val, None)?;
    println!(
        "Loaded {} training / {} validation images",
        dataset_train.len(),
        dataset_val.len()
    );

    let mut stages = Vec::new();
    if args.stage_1 {
        println!("Training network heads");
        stages.push(TrainingStage {
            layers: "heads",
            lr_scale: 0.5,
            epochs: 80,
        });
    }
    if args.stage_2 {
        println!("Fine tune upper backbone stages");
        stages.push(TrainingStage {
            layers: "4+",
            lr_scale: 0.5,
            epochs: 240,
        });
    }
    if args.stage_3 {
        println!("Fine tune all layers");
        stages.push(TrainingStage {
            layers: "all",
            lr_scale: 0.05,
            epochs: 320,
        });
    }

    if args.no_run {
        println!("Skipping training (--no-run)");
        return Ok(());
    }
    if stages.is_empty() {
        println!("No training stages selected; pass --stage-1, --stage-2, and/or --stage-3.");
        return Ok(());
    }

    let pipeline = TransformPipeline::new(TransformConfig {
        target_size: Some(config.target_size),
        resize_mode: ResizeMode::Letterbox,
        flip_horizontal_prob: 0.5,
        scale_jitter_prob: 0.5,
        scale_jitter_min: 0.85,
        scale_jitter_max: 1.1,
        color_jitter_prob: 0.5,
        color_jitter_strength: 0.1,
        blur_prob: 0.5,
        blur_sigma: 1.0,
        max_instances: config.max_gt_instances,
        ..TransformConfig::default()
    });

    let ckpts = CheckpointDir::create(&args.logs, &config.name)?;
    println!("Checkpoints: {}", ckpts.run_dir().display());
    let report = fit(
        config,
        &stages,
        &dataset_train,
        &dataset_val,
        &pipeline,
        &ckpts,
        Some(weights),
    )?;
    println!(
        "Training complete: {} epochs, final loss {:.4}, val loss {:.4}",
        report.epochs_run, report.final_train_loss, report.final_val_loss
    );
    if let Some(path) = report.last_checkpoint {
        println!("Saved checkpoint to {}", path.display());
    }
    Ok(())
}

fn evaluate(args: &Args, config: &NetConfig, weights: &PathBuf) -> anyhow::Result<()> {
    let dataset_val = load_coco(&args.dataset, Subset::Val, None)?;
    if args.no_run {
        println!("Skipping evaluation (--no-run)");
        return Ok(());
    }
    let limit = if args.limit == 0 {
        dataset_val.len()
    } else {
        args.limit.min(dataset_val.len())
    };
    println!("Running COCO evaluation on {limit} images.");

    let mut det = BurnDetector::from_weights(config.clone(), Some(weights));
    let mut results = Vec::new();
    let t_start = Instant::now();
    let mut t_prediction = 0.0f64;
    let mut evaluated = 0usize;

    for record in dataset_val.images.iter().take(limit) {
        let img = image::open(&record.path)
            .map_err(|e| anyhow::anyhow!("failed to open image {}: {e}", record.path.display()))?
            .to_rgb8();
        let frame = Frame {
            id: record.id as u64,
            image: img,
            path: Some(record.path.clone()),
        };

        let t = Instant::now();
        let detection = det.detect(&frame);
        t_prediction += t.elapsed().as_secs_f64();
        evaluated += 1;

        results.extend(build_coco_results(
            &dataset_val.classes,
            record.id,
            &detection,
            (record.width, record.height),
        ));
    }

    let out_path = args.logs.join(timestamped_name("coco_results", "json"));
    write_results(&out_path, &results)?;
    println!("Wrote {} results to {}", results.len(), out_path.display());
    println!(
        "Prediction time: {:.3}s. Average {:.3}s/image",
        t_prediction,
        t_prediction / evaluated.max(1) as f64
    );
    println!("Total time: {:.3}s", t_start.elapsed().as_secs_f64());
    Ok(())
}
