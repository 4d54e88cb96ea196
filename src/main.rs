use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;
use worker::{TrainConfig, runner};

#[derive(Parser)]
#[command(about = "Sparse parameter-server training", version)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Train with several workers and a single server inside this process
    Local {
        /// JSON training configuration
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Training data, one instance per line
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        #[arg(long, default_value_t = 1)]
        epochs: usize,

        #[arg(long, default_value = "1")]
        workers: NonZeroUsize,

        /// Parameters are written to <OUTPUT>-0.txt
        #[arg(long, value_name = "PREFIX")]
        output: PathBuf,
    },

    /// Serve one node of the parameter server tier
    Server {
        /// JSON training configuration
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        #[arg(long, value_name = "ADDR")]
        listen: SocketAddr,

        /// Workers to wait for
        #[arg(long)]
        workers: NonZeroUsize,

        /// Index of this node within the tier
        #[arg(long, default_value_t = 0)]
        rank: usize,

        /// Parameters are written to <OUTPUT>-<RANK>.txt
        #[arg(long, value_name = "PREFIX")]
        output: PathBuf,
    },

    /// Train against a running server tier
    Worker {
        /// JSON training configuration
        #[arg(long, value_name = "FILE")]
        config: PathBuf,

        /// Training data, one instance per line
        #[arg(long, value_name = "FILE")]
        data: PathBuf,

        #[arg(long, default_value_t = 1)]
        epochs: usize,

        /// Every server node, in rank order
        #[arg(long, value_name = "ADDR", num_args = 1.., required = true)]
        servers: Vec<SocketAddr>,
    },
}

fn load_config(path: &Path) -> anyhow::Result<TrainConfig> {
    TrainConfig::from_path(path).with_context(|| format!("invalid configuration {}", path.display()))
}

async fn run(mode: Mode, cancel: CancellationToken) -> anyhow::Result<()> {
    match mode {
        Mode::Local {
            config,
            data,
            epochs,
            workers,
            output,
        } => {
            let config = load_config(&config)?;
            let path = tokio::task::spawn_blocking(move || {
                runner::run_local(&config, &data, epochs, workers, &output, &cancel)
            })
            .await??;

            info!("training finished, parameters in {}", path.display());
        }
        Mode::Server {
            config,
            listen,
            workers,
            rank,
            output,
        } => {
            let config = load_config(&config)?;
            let path = runner::run_server(&config, listen, workers, rank, &output, &cancel)
                .await
                .with_context(|| format!("server {rank} failed"))?;

            info!("serving finished, parameters in {}", path.display());
        }
        Mode::Worker {
            config,
            data,
            epochs,
            servers,
        } => {
            let config = load_config(&config)?;
            let reports = runner::run_worker(&config, &data, epochs, &servers, &cancel)
                .await
                .context("worker failed")?;

            let loss = reports.last().map(|report| report.loss.mean()).unwrap_or_default();
            info!(epochs = reports.len(), loss = loss; "training finished");
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping after the current round");
                cancel.cancel();
            }
        }
    });

    match run(cli.mode, cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
