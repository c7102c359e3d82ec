// =============================================================================
// Federated Data Loading Walkthrough — shoal
// =============================================================================
//
// Walks through iterating over a dataset partitioned across simulated
// workers:
//
//   1. Build a toy regression dataset (y = 3x - 1 with a little noise)
//   2. Federate it across two workers, "bob" and "alice"
//   3. Wrap the federation in a FederatedDataLoader
//   4. Run a few epochs; each batch names its worker, which selects that
//      worker's local model and optimizer state in a HashMap
//
// Moving models to remote workers is out of scope here: every worker's
// model lives in this process and is updated in place.
//
// Usage:
//   cargo run -p federated-walkthrough
//   cargo run -p federated-walkthrough -- --epochs 10 --batch-size 8
//   RUST_LOG=shoal_data=debug cargo run -p federated-walkthrough -- --drop-last

use std::collections::HashMap;
use std::process::ExitCode;
use std::sync::Arc;

use shoal_data::{
    federate, BaseDataset, Batch, Dataset, FederatedDataLoader, FederatedDataLoaderConfig,
    WorkerId,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

struct Config {
    epochs: usize,
    batch_size: usize,
    samples: usize,
    lr: f64,
    drop_last: bool,
    seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            epochs: 5,
            batch_size: 4,
            samples: 50,
            lr: 0.05,
            drop_last: false,
            seed: 42,
        }
    }
}

fn parse_args() -> Result<Config, String> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |name: &str| args.next().ok_or_else(|| format!("missing value for {name}"));
        match arg.as_str() {
            "--epochs" => cfg.epochs = parse(&value("--epochs")?, "--epochs")?,
            "--batch-size" => cfg.batch_size = parse(&value("--batch-size")?, "--batch-size")?,
            "--samples" => cfg.samples = parse(&value("--samples")?, "--samples")?,
            "--lr" => cfg.lr = parse(&value("--lr")?, "--lr")?,
            "--seed" => cfg.seed = parse(&value("--seed")?, "--seed")?,
            "--drop-last" => cfg.drop_last = true,
            other => return Err(format!("unknown argument: {other}")),
        }
    }
    Ok(cfg)
}

fn parse<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T, String> {
    raw.parse().map_err(|_| format!("invalid {name}: {raw}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-worker state, kept entirely on the caller's side
// ─────────────────────────────────────────────────────────────────────────────

/// A 1-D linear model `y = w*x + b` with plain SGD.
#[derive(Debug, Default)]
struct LocalModel {
    w: f64,
    b: f64,
    steps: usize,
}

impl LocalModel {
    /// One SGD step on a batch; returns the batch's mean squared error.
    fn step(&mut self, batch: &Batch, lr: f64) -> f64 {
        let n = batch.len() as f64;
        let (mut gw, mut gb, mut loss) = (0.0, 0.0, 0.0);
        for (x, y) in batch.features.iter().zip(&batch.labels) {
            let err = self.w * x + self.b - y;
            gw += 2.0 * err * x / n;
            gb += 2.0 * err / n;
            loss += err * err / n;
        }
        self.w -= lr * gw;
        self.b -= lr * gb;
        self.steps += 1;
        loss
    }
}

fn toy_regression(n: usize) -> shoal_data::Result<BaseDataset> {
    let xs: Vec<f64> = (0..n).map(|i| i as f64 / n as f64).collect();
    // deterministic wiggle instead of random noise
    let ys: Vec<f64> = xs
        .iter()
        .enumerate()
        .map(|(i, x)| 3.0 * x - 1.0 + 0.01 * ((i % 7) as f64 - 3.0))
        .collect();
    Ok(BaseDataset::from_flat(xs, &[1], ys, &[1])?
        .tag("#toy")
        .tag("#regression")
        .describe("y = 3x - 1"))
}

fn run(cfg: &Config) -> shoal_data::Result<()> {
    let data = toy_regression(cfg.samples)?;
    let workers = [WorkerId::new("bob"), WorkerId::new("alice")];
    let federation = Arc::new(federate(&data, &workers)?);

    for (worker, shard) in federation.iter() {
        info!(worker = %worker, samples = shard.len(), "shard ready");
    }

    let loader_cfg = FederatedDataLoaderConfig::default()
        .batch_size(cfg.batch_size)
        .shuffle(true)
        .drop_last(cfg.drop_last)
        .seed(cfg.seed);
    let mut loader = FederatedDataLoader::new(Arc::clone(&federation), loader_cfg)?;

    for (worker, count) in loader.batches_per_worker() {
        if count == 0 {
            warn!(worker = %worker, "no batches this pass");
        }
    }

    let mut models: HashMap<WorkerId, LocalModel> = HashMap::new();
    let total = loader.len();

    for epoch in 1..=cfg.epochs {
        let mut epoch_loss = 0.0;
        for (i, batch) in loader.iter_epoch().enumerate() {
            let model = models.entry(batch.worker.clone()).or_default();
            let loss = model.step(&batch, cfg.lr);
            epoch_loss += loss;
            if i % 5 == 0 {
                println!(
                    "Train Epoch: {epoch} [{}/{total}] worker={} loss: {loss:.6}",
                    i + 1,
                    batch.worker
                );
            }
        }
        if total > 0 {
            info!(epoch, mean_loss = epoch_loss / total as f64, "epoch done");
        }
    }

    println!();
    for worker in federation.workers() {
        match models.get(worker) {
            Some(m) => println!(
                "{worker}: w={:.3} b={:.3} after {} steps",
                m.w, m.b, m.steps
            ),
            None => println!("{worker}: never trained"),
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = match parse_args() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    match run(&cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
