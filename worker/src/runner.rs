use std::{
    net::SocketAddr,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use comms::specs::machine_learning::ModelSpec;
use log::info;
use machine_learning::{
    Kernel, ParamAccess,
    models::{LinearKernel, Word2VecKernel},
};
use parameter_server::{
    build_server,
    service::{ServerHandle, serve},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::{
    Result, WorkerErr,
    client::{InProcessClient, RemoteClient},
    config::{ConfigErr, TrainConfig},
    loop_::TrainingLoop,
    metrics::EpochReport,
};

/// Calls `$body` with `$kernel` bound to a factory of the configured model's kernel.
macro_rules! with_kernel {
    ($config:expr, |$kernel:ident| $body:expr) => {{
        let lr = $config.server.learning_rate;
        match $config.model {
            ModelSpec::Linear(spec) => {
                let $kernel = move || LinearKernel::new(spec, lr);
                $body
            }
            ModelSpec::Word2vec(spec) => {
                let $kernel = move || Word2VecKernel::new(spec, lr);
                $body
            }
        }
    }};
}

/// Trains with `workers` threads against a single server living in this process.
///
/// # Arguments
/// * `config` - A validated configuration.
/// * `data` - The training file, read whole by every worker.
/// * `epochs` - The amount of passes over `data`.
/// * `workers` - The size of the cohort.
/// * `output` - The prefix of the parameter dump.
/// * `cancel` - Stops every worker between two rounds.
///
/// # Returns
/// The path of the parameter dump.
pub fn run_local(
    config: &TrainConfig,
    data: &Path,
    epochs: usize,
    workers: NonZeroUsize,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    with_kernel!(config, |kernel| local(
        config, kernel, data, epochs, workers, output, cancel
    ))
}

fn local<K, F>(
    config: &TrainConfig,
    make_kernel: F,
    data: &Path,
    epochs: usize,
    workers: NonZeroUsize,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf>
where
    K: Kernel,
    F: Fn() -> K + Sync,
{
    let server = build_server(0, workers.get(), make_kernel().access(), &config.server)
        .map_err(ConfigErr::from)?;
    let server = Arc::new(server);

    info!(workers = workers.get(), epochs = epochs; "starting local training");

    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = (0..workers.get())
            .map(|_| {
                let server = Arc::clone(&server);
                let make_kernel = &make_kernel;

                s.spawn(move || -> Result<Vec<EpochReport>> {
                    let client = InProcessClient::join(vec![server])?;
                    TrainingLoop::new(make_kernel(), client, config.worker.clone(), cancel.clone())?
                        .run(data, epochs)
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .map_err(|_| WorkerErr::Join("worker thread panicked".to_string()))
                    .and_then(|res| res)
            })
            .collect()
    });

    for res in results {
        res?;
    }

    Ok(server.dump(output)?)
}

/// Serves one server node of the tier until every worker of its cohort disconnects.
///
/// # Arguments
/// * `config` - A validated configuration.
/// * `listen` - The address to bind.
/// * `workers` - The size of the cohort.
/// * `rank` - The index of this node within the tier.
/// * `output` - The prefix of the parameter dump.
/// * `cancel` - Stops serving and detaches the cohort, the parameters are dumped anyway.
///
/// # Returns
/// The path of the parameter dump.
pub async fn run_server(
    config: &TrainConfig,
    listen: SocketAddr,
    workers: NonZeroUsize,
    rank: usize,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let listener = TcpListener::bind(listen).await?;
    info!(rank = rank, workers = workers.get(); "listening on {}", listener.local_addr()?);

    with_kernel!(config, |kernel| serve_node(
        config,
        kernel().access(),
        listener,
        workers,
        rank,
        output,
        cancel
    )
    .await)
}

/// Like `run_server`, over an already bound listener.
pub async fn serve_node<A: ParamAccess>(
    config: &TrainConfig,
    access: A,
    listener: TcpListener,
    workers: NonZeroUsize,
    rank: usize,
    output: &Path,
    cancel: &CancellationToken,
) -> Result<PathBuf> {
    let server = build_server(rank, workers.get(), access, &config.server).map_err(ConfigErr::from)?;
    let server = Arc::new(server);

    tokio::select! {
        res = serve(listener, ServerHandle::new(Arc::clone(&server))) => res?,
        _ = cancel.cancelled() => {
            info!(rank = rank; "serving cancelled");
            server.shutdown();
        }
    }

    Ok(server.dump(output)?)
}

/// Trains against a remote server tier.
///
/// # Arguments
/// * `config` - A validated configuration.
/// * `data` - The training file.
/// * `epochs` - The amount of passes over `data`.
/// * `servers` - The server tier, in partition order.
/// * `cancel` - Stops the worker between two rounds.
///
/// # Returns
/// The report of every epoch.
pub async fn run_worker(
    config: &TrainConfig,
    data: &Path,
    epochs: usize,
    servers: &[SocketAddr],
    cancel: &CancellationToken,
) -> Result<Vec<EpochReport>> {
    let client = RemoteClient::connect(servers).await?;
    let data = data.to_path_buf();
    let spec = config.worker.clone();
    let cancel = cancel.clone();

    with_kernel!(config, |kernel| {
        let training = TrainingLoop::new(kernel(), client, spec, cancel)?;
        tokio::task::spawn_blocking(move || training.run(&data, epochs))
            .await
            .map_err(|e| WorkerErr::Join(e.to_string()))?
    })
}
