//! Train the detector on the zuppa product dataset, or apply the color
//! splash effect to an image or video.

use clap::Parser;
use std::fs;
use std::path::PathBuf;

use detector::{fit, resolve_weights, BurnDetector, CheckpointDir, NetConfig, TrainingStage};
use seg_dataset::{load_via, ResizeMode, Subset, TransformConfig, TransformPipeline};
use shelfscan_tools::video::splash_video;
use shelfscan_tools::{splash_image, timestamped_name};

const MAX_EPOCHS: usize = 200;

#[derive(Parser, Debug)]
#[command(
    name = "zuppa",
    about = "Train on the zuppa product dataset or apply color splash"
)]
struct Args {
    /// 'train' or 'splash'.
    command: String,
    /// Directory of the zuppa dataset (train/ and val/ VIA exports).
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// Path to a weights file, or one of 'coco', 'last', 'imagenet'.
    #[arg(long)]
    weights: String,
    /// Logs and checkpoints directory.
    #[arg(long, default_value = "logs")]
    logs: PathBuf,
    /// Image to apply the color splash effect on.
    #[arg(long)]
    image: Option<PathBuf>,
    /// Video to apply the color splash effect on.
    #[arg(long)]
    video: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command.as_str() {
        "train" if args.dataset.is_none() => {
            anyhow::bail!("Argument --dataset is required for training")
        }
        "splash" if args.image.is_none() && args.video.is_none() => {
            anyhow::bail!("Provide --image or --video to apply color splash")
        }
        _ => {}
    }

    println!("Weights: {}", args.weights);
    println!(
        "Dataset: {}",
        args.dataset
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<none>".to_string())
    );
    println!("Logs: {}", args.logs.display());

    let config = if args.command == "train" {
        NetConfig::zuppa()
    } else {
        NetConfig::zuppa().inference()
    };
    config.display();

    fs::create_dir_all(&args.logs)?;
    let weights = resolve_weights(&args.weights, &args.logs)?;
    println!("Loading weights {}", weights.display());

    match args.command.as_str() {
        "train" => train(&args, &config, &weights),
        "splash" => splash(&args, &config, &weights),
        other => anyhow::bail!("'{other}' is not recognized. Use 'train' or 'splash'"),
    }
}

fn train(args: &Args, config: &NetConfig, weights: &PathBuf) -> anyhow::Result<()> {
    let Some(dataset_dir) = args.dataset.as_deref() else {
        anyhow::bail!("Argument --dataset is required for training");
    };
    let dataset_train = load_via(dataset_dir, Subset::Train)?;
    let dataset_val = load_via(dataset_dir, Subset::Val)?;
    println!(
        "Loaded {} training / {} validation images",
        dataset_train.len(),
        dataset_val.len()
    );

    // The dataset is small and starts from pretrained weights, so only the
    // heads are trained, with augmentation carrying the variety.
    let pipeline = TransformPipeline::new(TransformConfig {
        target_size: Some(config.target_size),
        resize_mode: ResizeMode::Letterbox,
        flip_horizontal_prob: 0.5,
        scale_jitter_prob: 0.75,
        scale_jitter_min: 0.8,
        scale_jitter_max: 1.2,
        color_jitter_prob: 0.75,
        color_jitter_strength: 0.4,
        blur_prob: 0.75,
        blur_sigma: 1.0,
        max_instances: config.max_gt_instances,
        ..TransformConfig::default()
    });
    println!("Augmentation: {}", pipeline.describe());

    let stages = [TrainingStage {
        layers: "heads",
        lr_scale: 1.0,
        epochs: MAX_EPOCHS,
    }];
    println!("Training network heads");

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

fn splash(args: &Args, config: &NetConfig, weights: &PathBuf) -> anyhow::Result<()> {
    let mut det = BurnDetector::from_weights(config.clone(), Some(weights));

    if let Some(image_path) = &args.image {
        let out = splash_image(&mut det, image_path)?;
        println!("Saved to {}", out.display());
    } else if let Some(video_path) = &args.video {
        let out = PathBuf::from(timestamped_name("splash", "avi"));
        splash_video(&mut det, video_path, &out)?;
        println!("Saved to {}", out.display());
    }
    Ok(())
}
