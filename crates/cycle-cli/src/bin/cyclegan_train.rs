//! CycleGAN training CLI.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release -p cycle-cli --bin cyclegan-train -- \
//!   --dataset horse2zebra --train-epoch 200 --decay-epoch 100 \
//!   --lrG 2e-4 --lrD 2e-4 --lambdaA 10 --lambdaB 10
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;

use clap::Parser;
use cycle_cli::TrainArgs;
use cycle_train::{CancelToken, LossKind};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = TrainArgs::parse();
    match cycle_cli::run(&args, &CancelToken::new()) {
        Ok(history) => {
            let last = history.last();
            tracing::info!(
                epochs = history.epochs_completed(),
                mean_epoch_secs = history.mean_epoch_time().unwrap_or_default(),
                total_secs = history.total_time,
                final_g_a = last.map(|s| s.means.get(LossKind::GA)).unwrap_or_default(),
                final_d_a = last.map(|s| s.means.get(LossKind::DA)).unwrap_or_default(),
                results = %args.results_dir().display(),
                "training finished"
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "training failed");
            ExitCode::FAILURE
        }
    }
}
