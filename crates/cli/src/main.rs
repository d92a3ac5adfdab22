use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use candle_core::{Device, Tensor};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use entangle_common::EntangleConfig;
use entangle_core::{EntangledLoss, DEFAULT_ENTANGLE_WEIGHT};
use entangle_train::{get_lambda, EntangledTrainer, DEFAULT_MAX_EPOCHS, DEFAULT_MAX_LAMBDA};

#[derive(Parser, Debug)]
#[command(name = "entangle", about = "Entangled loss and lambda schedule tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the penalty weight for one epoch, or the whole ramp.
    Lambda(LambdaArgs),
    /// Evaluate the entangled loss on probabilities given inline.
    Loss(LossArgs),
    /// Train an entangled pair on a synthetic cluster problem.
    Train(TrainArgs),
}

// ── Lambda ─────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct LambdaArgs {
    /// Omit to print every epoch from 0 to `max_epochs`.
    #[arg(long)]
    epoch: Option<usize>,
    #[arg(long, default_value_t = DEFAULT_MAX_EPOCHS)]
    max_epochs: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_LAMBDA)]
    max_lambda: f64,
}

// ── Loss ───────────────────────────────────────────────────────────────────────

/// Distributions are written as rows separated by `;`, values by `,`
/// (e.g. `0,1,0;1,0,0`).
#[derive(Parser, Debug)]
struct LossArgs {
    #[arg(long)]
    y_true: String,
    #[arg(long)]
    y_self: String,
    #[arg(long)]
    y_other: String,
    #[arg(long, default_value_t = DEFAULT_ENTANGLE_WEIGHT)]
    weight: f64,
}

// ── Train ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainArgs {
    /// Loaded if present, otherwise created with defaults.
    #[arg(long, default_value = "entangle.json")]
    config: PathBuf,
    #[arg(long, default_value_t = 600)]
    samples: usize,
    #[arg(long, default_value_t = 30)]
    epochs: usize,
    #[arg(long, default_value_t = 32)]
    batch_size: usize,
    /// Seeds the synthetic data and the per-epoch shuffle.
    #[arg(long, default_value_t = 42)]
    seed: u64,
    /// Write both models and the config here when training finishes.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Lambda(args) => cmd_lambda(args),
        Command::Loss(args) => cmd_loss(args),
        Command::Train(args) => cmd_train(args),
    }
}

// ── Command implementations ────────────────────────────────────────────────────

fn cmd_lambda(args: LambdaArgs) -> Result<()> {
    match args.epoch {
        Some(epoch) => println!("{}", get_lambda(epoch, args.max_epochs, args.max_lambda)),
        None => {
            for epoch in 0..=args.max_epochs {
                println!(
                    "{epoch:>4}  {:.6}",
                    get_lambda(epoch, args.max_epochs, args.max_lambda)
                );
            }
        }
    }
    Ok(())
}

fn cmd_loss(args: LossArgs) -> Result<()> {
    let device = Device::Cpu;
    let y_true = parse_rows(&args.y_true, &device).context("--y-true")?;
    let y_self = parse_rows(&args.y_self, &device).context("--y-self")?;
    let y_other = parse_rows(&args.y_other, &device).context("--y-other")?;

    let parts = EntangledLoss::new()
        .with_weight(args.weight)
        .components(&y_true, &y_self, &y_other)?;
    println!("base        {:.6}", parts.base.to_scalar::<f32>()?);
    println!("divergence  {:.6}", parts.divergence.to_scalar::<f32>()?);
    println!("total       {:.6}", parts.total.to_scalar::<f32>()?);
    Ok(())
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = if args.config.exists() {
        EntangleConfig::load(&args.config)?
    } else {
        let default = EntangleConfig::default();
        default.save(&args.config)?;
        eprintln!("Created default config at {}", args.config.display());
        default
    };
    if args.batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }
    check_train_config(&config)?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let device = Device::cuda_if_available(0)?;
    let (x, y) = synthetic_clusters(&config, args.samples, &mut rng, &device)?;
    let (x_val, y_val) = synthetic_clusters(&config, args.samples / 4 + 1, &mut rng, &device)?;
    let mut trainer = EntangledTrainer::new(config, device)?;

    let pb = ProgressBar::new(args.epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} epochs {msg}")?
            .progress_chars("=>-"),
    );

    let samples = u32::try_from(args.samples).context("--samples does not fit in u32")?;
    let mut order: Vec<u32> = (0..samples).collect();
    for epoch in 0..args.epochs {
        order.shuffle(&mut rng);
        let idx = Tensor::new(order.as_slice(), trainer.device())?;
        let (x_epoch, y_epoch) = (x.index_select(&idx, 0)?, y.index_select(&idx, 0)?);

        let mut left_sum = 0.0f32;
        let mut right_sum = 0.0f32;
        let mut batches = 0usize;
        let lambda = trainer.current_lambda();
        for start in (0..args.samples).step_by(args.batch_size) {
            let len = args.batch_size.min(args.samples - start);
            let m = trainer.step(
                &x_epoch.narrow(0, start, len)?,
                &y_epoch.narrow(0, start, len)?,
            )?;
            left_sum += m.left.total;
            right_sum += m.right.total;
            batches += 1;
        }
        trainer.end_epoch();

        let eval = trainer.evaluate(&x_val, &y_val)?;
        tracing::debug!(
            epoch,
            lambda = format!("{lambda:.4}"),
            left_loss = format!("{:.4}", left_sum / batches.max(1) as f32),
            right_loss = format!("{:.4}", right_sum / batches.max(1) as f32),
            left_acc = format!("{:.3}", eval.left_accuracy),
            right_acc = format!("{:.3}", eval.right_accuracy),
            agreement = format!("{:.3}", eval.agreement),
            "epoch done"
        );
        pb.set_message(format!("lambda {lambda:.4} agree {:.3}", eval.agreement));
        pb.inc(1);
    }
    pb.finish_with_message("done");

    let eval = trainer.evaluate(&x_val, &y_val)?;
    tracing::info!(
        left_accuracy = eval.left_accuracy,
        right_accuracy = eval.right_accuracy,
        agreement = eval.agreement,
        "Training finished"
    );
    println!(
        "left acc {:.3}  right acc {:.3}  agreement {:.3}  KL {:.5}",
        eval.left_accuracy, eval.right_accuracy, eval.agreement, eval.divergence
    );

    if let Some(dir) = args.output_dir {
        let path = trainer.save(&dir)?;
        eprintln!("Saved entangled pair to {}", path.display());
    }
    Ok(())
}

// ── Helpers ────────────────────────────────────────────────────────────────────

/// Parse `a,b,c;d,e,f` into a `(rows, cols)` f32 tensor.
fn parse_rows(s: &str, device: &Device) -> Result<Tensor> {
    let mut values = Vec::new();
    let mut cols: Option<usize> = None;
    let mut rows = 0usize;
    for row in s.split(';').map(str::trim).filter(|r| !r.is_empty()) {
        let parsed = row
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("invalid number in row {row:?}"))?;
        match cols {
            None => cols = Some(parsed.len()),
            Some(c) if c != parsed.len() => {
                bail!("row {row:?} has {} values, expected {c}", parsed.len())
            }
            Some(_) => {}
        }
        values.extend(parsed);
        rows += 1;
    }
    let Some(cols) = cols else {
        bail!("no rows given");
    };
    Ok(Tensor::from_vec(values, (rows, cols), device)?)
}

/// Config values the synthetic problem and the classifiers cannot work with.
fn check_train_config(config: &EntangleConfig) -> Result<()> {
    if config.num_classes == 0 {
        bail!("num_classes must be at least 1");
    }
    if config.input_dim == 0 {
        bail!("input_dim must be at least 1");
    }
    Ok(())
}

/// `n` points spread over `num_classes` Gaussian clusters whose centres sit
/// on a circle of radius 3. Labels are one-hot.
fn synthetic_clusters(
    config: &EntangleConfig,
    n: usize,
    rng: &mut StdRng,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    check_train_config(config)?;
    let (dim, classes) = (config.input_dim, config.num_classes);
    let normal = Normal::new(0.0f32, 0.5)?;
    let mut centres = Vec::with_capacity(n * dim);
    let mut one_hot = vec![0f32; n * classes];
    for i in 0..n {
        let class = i % classes;
        let angle = std::f32::consts::TAU * class as f32 / classes as f32;
        for d in 0..dim {
            let centre = if d % 2 == 0 {
                3.0 * angle.cos()
            } else {
                3.0 * angle.sin()
            };
            centres.push(centre + normal.sample(rng));
        }
        one_hot[i * classes + class] = 1.0;
    }
    let x = Tensor::from_vec(centres, (n, dim), device)?;
    let y = Tensor::from_vec(one_hot, (n, classes), device)?;
    Ok((x, y))
}
