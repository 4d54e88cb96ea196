use std::{
    io::{self, BufRead, Seek},
    num::NonZeroUsize,
    path::Path,
    time::Instant,
};

use comms::specs::worker::WorkerSpec;
use log::{debug, info, warn};
use machine_learning::{ActiveKeySet, Key, Kernel, LocalParamCache, Loss};
use rand::{SeedableRng, rngs::StdRng};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;

use crate::{
    Result, WorkerErr,
    client::PullPushClient,
    data::{LineSource, Window},
    gather::KeyGatherer,
    metrics::EpochReport,
};

/// Rounds referencing fewer keys than this end the epoch.
pub const MIN_ROUND_KEYS: usize = 5;

/// What a compute task went through.
#[derive(Default)]
struct Processed {
    lines: usize,
    skipped: usize,
    loss: Loss,
}

/// Drives the pull, compute and push rounds of a worker over a training file.
///
/// The thread pool, the cache and the round state live as long as the loop, every
/// round submits one task per pool thread and joins all of them before pushing.
pub struct TrainingLoop<K: Kernel, C> {
    kernel: K,
    client: C,
    cache: LocalParamCache<K::Access>,
    round: K::Round,
    pool: ThreadPool,
    spec: WorkerSpec,
    cancel: CancellationToken,
    seed: u64,
}

impl<K, C> TrainingLoop<K, C>
where
    K: Kernel,
    C: PullPushClient<K::Access>,
{
    /// Creates a new `TrainingLoop`.
    ///
    /// # Arguments
    /// * `kernel` - The model to train.
    /// * `client` - A client that already joined the server tier.
    /// * `spec` - The worker's execution bounds.
    /// * `cancel` - Checked between rounds.
    pub fn new(kernel: K, client: C, spec: WorkerSpec, cancel: CancellationToken) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(spec.threads.get())
            .thread_name(|i| format!("compute-{i}"))
            .build()
            .map_err(io::Error::other)?;

        let seed = spec.seed.unwrap_or_else(rand::random);

        Ok(Self {
            cache: LocalParamCache::new(kernel.access()),
            round: Default::default(),
            kernel,
            client,
            pool,
            spec,
            cancel,
            seed,
        })
    }

    pub fn rank(&self) -> usize {
        self.client.rank()
    }

    /// Trains over the file at `path` for `epochs` epochs and leaves the cohort.
    ///
    /// On failure the cohort is left as well, so the rest of the workers are not kept
    /// waiting for this one.
    ///
    /// # Returns
    /// The report of every epoch.
    pub fn run(mut self, path: &Path, epochs: usize) -> Result<Vec<EpochReport>> {
        let rank = self.rank();
        info!(rank = rank, epochs = epochs; "starting training");

        let mut reports = Vec::with_capacity(epochs);
        for epoch in 0..epochs {
            let report = LineSource::open(path)
                .map_err(WorkerErr::from)
                .and_then(|mut source| self.epoch(epoch, &mut source));

            match report {
                Ok(report) => {
                    report.log(rank);
                    reports.push(report);
                }
                Err(e) => {
                    self.cache.clear();
                    if let Err(leave_err) = self.client.leave() {
                        warn!(rank = rank; "failed to leave the cohort: {leave_err}");
                    }

                    return Err(e);
                }
            }
        }

        self.client.leave()?;
        Ok(reports)
    }

    /// Runs a whole epoch over `source`, which must be positioned at its start.
    pub fn epoch<R>(&mut self, epoch: usize, source: &mut LineSource<R>) -> Result<EpochReport>
    where
        R: BufRead + Seek + Send,
    {
        let Self {
            kernel,
            client,
            cache,
            round,
            pool,
            spec,
            cancel,
            seed,
        } = self;

        let rank = client.rank();
        let gatherer = KeyGatherer::new(kernel, pool, spec.chunk);
        let mut report = EpochReport::new(epoch);
        cache.clear();

        let start = Instant::now();
        let all = gatherer.gather(source, None)?;
        report.gather_time += start.elapsed();

        if all.keys.len() < MIN_ROUND_KEYS {
            info!(rank = rank, epoch = epoch, keys = all.keys.len(); "too few keys to train");
            let start = Instant::now();
            client.epoch_done()?;
            report.sync_time += start.elapsed();
            return Ok(report);
        }

        let keys = sorted(all.keys);
        cache.init_keys(&keys);

        let start = Instant::now();
        client.pull(&keys, cache)?;
        report.sync_time += start.elapsed();
        cache.clear();

        debug!(rank = rank, epoch = epoch, keys = keys.len(); "initial pull done");

        let cost = NonZeroUsize::new(kernel.lines_per_instance()).unwrap_or(NonZeroUsize::MIN);
        let minibatch = spec.minibatch.get();

        loop {
            if cancel.is_cancelled() {
                info!(rank = rank, epoch = epoch, rounds = report.rounds; "training cancelled");
                return Err(WorkerErr::Cancelled { epoch });
            }

            let start = Instant::now();
            let gathered = gatherer.gather(source, Some(minibatch))?;
            report.gather_time += start.elapsed();

            if gathered.keys.len() < MIN_ROUND_KEYS {
                debug!(rank = rank, keys = gathered.keys.len(); "window too small, ending epoch");
                break;
            }

            let keys = sorted(gathered.keys);
            cache.init_keys(&keys);

            let start = Instant::now();
            client.pull(&keys, cache)?;
            report.sync_time += start.elapsed();

            kernel.prepare_round(&gathered.freq, round)?;

            let start = Instant::now();
            let round_seed = task_seed(*seed, &[rank as u64, epoch as u64, report.rounds as u64]);
            let processed = {
                let window = Window::new(source, Some(minibatch), cost, spec.chunk);
                let cache = &*cache;
                let kernel = &*kernel;
                let round = &*round;

                pool.broadcast(|ctx| {
                    let mut rng = StdRng::seed_from_u64(task_seed(round_seed, &[ctx.index() as u64]));
                    compute(kernel, &window, round, cache, &mut rng)
                })
            };
            report.compute_time += start.elapsed();

            for task in processed {
                let task = task?;
                report.add_lines(task.lines, task.skipped);
                report.loss.merge(&task.loss);
            }

            let start = Instant::now();
            client.push(&keys, cache)?;
            report.sync_time += start.elapsed();
            cache.clear();

            report.bump_round();
            debug!(
                rank = rank,
                epoch = epoch,
                round = report.rounds,
                keys = keys.len();
                "round finished"
            );

            if source.at_eof()? {
                break;
            }
        }

        let start = Instant::now();
        client.epoch_done()?;
        report.sync_time += start.elapsed();

        Ok(report)
    }
}

/// Feeds the window's lines to the kernel until the window is exhausted.
fn compute<K, R>(
    kernel: &K,
    window: &Window<'_, R>,
    round: &K::Round,
    cache: &LocalParamCache<K::Access>,
    rng: &mut StdRng,
) -> io::Result<Processed>
where
    K: Kernel,
    R: BufRead + Seek,
{
    let mut processed = Processed::default();
    let mut instance = K::Instance::default();
    let mut chunk = Vec::new();

    while window.next_chunk(&mut chunk)? {
        for line in &chunk {
            processed.lines += 1;

            match kernel.parse(line, &mut instance) {
                Ok(true) => kernel.learn(&instance, round, cache, rng, &mut processed.loss),
                Ok(false) => {}
                // Already reported by the gatherer.
                Err(_) => processed.skipped += 1,
            }
        }
    }

    Ok(processed)
}

fn sorted(keys: ActiveKeySet) -> Vec<Key> {
    let mut keys: Vec<_> = keys.into_iter().collect();
    keys.sort_unstable();
    keys
}

/// Mixes `parts` into `seed` (splitmix64 finalizer).
fn task_seed(seed: u64, parts: &[u64]) -> u64 {
    parts.iter().fold(seed, |acc, &part| {
        let mut z = acc.wrapping_add(part).wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io::Cursor,
        sync::{Arc, atomic::Ordering},
    };

    use comms::specs::{
        machine_learning::{LinearSpec, UpdateTarget, Word2VecSpec},
        server::{ParamGenSpec, ServerSpec},
    };
    use machine_learning::models::{
        LinearAccess, LinearKernel, Word2VecAccess, Word2VecKernel, word2vec::token_key,
    };
    use parameter_server::{ParameterServer, build_server};

    use super::*;
    use crate::client::InProcessClient;

    fn nz(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn worker_spec(minibatch: usize) -> WorkerSpec {
        WorkerSpec {
            minibatch: nz(minibatch),
            threads: nz(2),
            chunk: nz(2),
            seed: Some(7),
        }
    }

    fn training_loop(
        kernel: LinearKernel,
        minibatch: usize,
    ) -> (
        TrainingLoop<LinearKernel, InProcessClient<LinearAccess>>,
        Arc<ParameterServer<LinearAccess>>,
    ) {
        let spec = ServerSpec {
            learning_rate: 0.1,
            shards: nz(4),
            init: Some(ParamGenSpec::Const { value: 0.0 }),
            seed: Some(1),
            barrier_timeout_secs: Some(10),
        };
        let server = Arc::new(build_server(0, 1, kernel.access(), &spec).unwrap());
        let client = InProcessClient::join(vec![server.clone()]).unwrap();
        let lp = TrainingLoop::new(kernel, client, worker_spec(minibatch), CancellationToken::new()).unwrap();

        (lp, server)
    }

    fn no_double_count() -> LinearKernel {
        LinearKernel::new(
            LinearSpec {
                count_lines_twice: false,
            },
            0.1,
        )
    }

    const DATA: &str = "1 1 2 3\n0 4 5 6\n1 1 5 7\n0 2 6 8\n1 3 4 9\n";

    #[test]
    fn rounds_cover_the_file() {
        let (mut lp, server) = training_loop(no_double_count(), 2);
        let mut source = LineSource::new(Cursor::new(DATA.to_string()));

        let report = lp.epoch(0, &mut source).unwrap();

        assert_eq!(report.rounds, 2);
        assert_eq!(report.lines, 4);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.loss.count(), 4);
        assert_eq!(server.store().len(), 9);
    }

    #[test]
    fn double_counting_halves_the_window() {
        let kernel = LinearKernel::new(LinearSpec::default(), 0.1);
        let (mut lp, _server) = training_loop(kernel, 4);
        let mut source = LineSource::new(Cursor::new(DATA.to_string()));

        let report = lp.epoch(0, &mut source).unwrap();

        // Two lines per round, the last window only references the keys of one line.
        assert_eq!(report.rounds, 2);
        assert_eq!(report.lines, 4);
    }

    #[test]
    fn few_keys_skip_training() {
        let (mut lp, server) = training_loop(no_double_count(), 2);
        let mut source = LineSource::new(Cursor::new("1 1 2\n0 1 2\n".to_string()));

        let report = lp.epoch(0, &mut source).unwrap();

        assert_eq!(report.rounds, 0);
        assert_eq!(report.lines, 0);
        assert_eq!(server.store().len(), 0);
    }

    #[test]
    fn cancellation_is_observed_between_rounds() {
        let (mut lp, _server) = training_loop(no_double_count(), 2);
        lp.cancel.cancel();
        let mut source = LineSource::new(Cursor::new(DATA.to_string()));

        let err = lp.epoch(3, &mut source).unwrap_err();
        assert!(matches!(err, WorkerErr::Cancelled { epoch: 3 }));
    }

    #[test]
    fn malformed_lines_do_not_abort_the_epoch() {
        let (mut lp, _server) = training_loop(no_double_count(), 8);
        let text = "1 1 2 3\nbad 4\n0 4 5 6\n1 2:0.5\n";
        let mut source = LineSource::new(Cursor::new(text.to_string()));

        let report = lp.epoch(0, &mut source).unwrap();

        assert_eq!(report.rounds, 1);
        assert_eq!(report.lines, 4);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.loss.count(), 2);
    }

    #[test]
    fn task_seeds_differ_per_part() {
        let a = task_seed(1, &[0, 0, 0]);
        let b = task_seed(1, &[0, 0, 1]);
        let c = task_seed(1, &[1, 0, 0]);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, task_seed(1, &[0, 0, 0]));
    }

    /// Forwards to `inner`, keeping the keys of every push along with the keys whose
    /// accumulators received something.
    struct Recording<C> {
        inner: C,
        pushes: Vec<(Vec<Key>, HashSet<Key>)>,
    }

    impl<C: PullPushClient<Word2VecAccess>> PullPushClient<Word2VecAccess> for Recording<C> {
        fn rank(&self) -> usize {
            self.inner.rank()
        }

        fn workers(&self) -> usize {
            self.inner.workers()
        }

        fn pull(&mut self, keys: &[Key], cache: &mut LocalParamCache<Word2VecAccess>) -> Result<()> {
            self.inner.pull(keys, cache)
        }

        fn push(&mut self, keys: &[Key], cache: &mut LocalParamCache<Word2VecAccess>) -> Result<()> {
            let touched = cache
                .grads()
                .filter(|(_, grad)| {
                    grad.hidden_count.load(Ordering::Relaxed) > 0
                        || grad.output_count.load(Ordering::Relaxed) > 0
                })
                .map(|(key, _)| key)
                .collect();

            self.pushes.push((keys.to_vec(), touched));
            self.inner.push(keys, cache)
        }

        fn epoch_done(&mut self) -> Result<()> {
            self.inner.epoch_done()
        }

        fn leave(&mut self) -> Result<()> {
            self.inner.leave()
        }
    }

    #[test]
    fn word2vec_rounds_only_touch_their_window() {
        let kernel = Word2VecKernel::new(
            Word2VecSpec {
                dim: 4,
                window: 2,
                negative: 6,
                min_sentence_length: 2,
                learning_rate: 0.025,
                table_size: 1000,
                update_target: UpdateTarget::Value,
            },
            0.1,
        );
        let spec = ServerSpec {
            learning_rate: 0.1,
            shards: nz(2),
            init: None,
            seed: Some(1),
            barrier_timeout_secs: Some(10),
        };
        let server = Arc::new(build_server(0, 1, kernel.access(), &spec).unwrap());
        let client = Recording {
            inner: InProcessClient::join(vec![server.clone()]).unwrap(),
            pushes: Vec::new(),
        };
        let mut lp = TrainingLoop::new(kernel, client, worker_spec(4), CancellationToken::new()).unwrap();

        let lines: Vec<_> = (0..12)
            .map(|i| format!("w{i} w{} w{} common", i + 1, i + 2))
            .collect();
        let mut source = LineSource::new(Cursor::new(lines.join("\n") + "\n"));

        let report = lp.epoch(0, &mut source).unwrap();

        assert_eq!(report.rounds, 3);
        assert_eq!(lp.client.pushes.len(), 3);

        for (window, (pushed, touched)) in lines.chunks(4).zip(&lp.client.pushes) {
            let gathered: HashSet<_> = window
                .iter()
                .flat_map(|line| line.split_whitespace().map(token_key))
                .collect();
            let pushed: HashSet<_> = pushed.iter().copied().collect();

            assert_eq!(pushed, gathered);
            assert!(touched.is_subset(&gathered), "{touched:?} outside {gathered:?}");
            assert_eq!(*touched, gathered);
        }

        // w0 ..= w13 plus the shared word
        assert_eq!(server.store().len(), 15);
    }
}
