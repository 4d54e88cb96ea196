use std::{
    io::{self, BufRead, Seek},
    num::NonZeroUsize,
};

use log::{debug, warn};
use machine_learning::{ActiveKeySet, FrequencyTable, Kernel};
use rayon::ThreadPool;

use crate::data::{LineSource, Window};

/// What a gathering pass found.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Gathered {
    pub keys: ActiveKeySet,
    /// Occurrences of every key, rebuilt on every pass.
    pub freq: FrequencyTable,
    /// Lines read, malformed and discarded ones included.
    pub lines: usize,
    /// Malformed lines.
    pub skipped: usize,
    pub hit_eof: bool,
}

impl Gathered {
    fn merge(&mut self, other: Gathered) {
        self.keys.extend(other.keys);
        for (key, count) in other.freq {
            *self.freq.entry(key).or_default() += count;
        }
        self.skipped += other.skipped;
    }
}

/// Finds the keys referenced by the next window of lines without consuming them.
///
/// Every task of the pool scans chunks of lines into its own key set, the partial
/// sets are merged once all of them finished.
pub struct KeyGatherer<'a, K> {
    kernel: &'a K,
    pool: &'a ThreadPool,
    chunk: NonZeroUsize,
}

impl<'a, K: Kernel> KeyGatherer<'a, K> {
    /// Creates a new `KeyGatherer`.
    ///
    /// # Arguments
    /// * `kernel` - The model, used to parse lines.
    /// * `pool` - The worker's thread pool.
    /// * `chunk` - Lines taken per task per lock acquisition.
    pub fn new(kernel: &'a K, pool: &'a ThreadPool, chunk: NonZeroUsize) -> Self {
        Self {
            kernel,
            pool,
            chunk,
        }
    }

    /// Scans up to `limit` lines from the current position of `source` and rewinds it.
    ///
    /// # Arguments
    /// * `source` - The training data.
    /// * `limit` - The amount of lines to scan, the rest of the input if `None`.
    pub fn gather<R>(&self, source: &mut LineSource<R>, limit: Option<usize>) -> io::Result<Gathered>
    where
        R: BufRead + Seek + Send,
    {
        let start = source.position()?;

        let window = Window::new(source, limit, NonZeroUsize::MIN, self.chunk);
        let partials = self.pool.broadcast(|_| self.scan(&window));
        let lines = window.taken();
        let hit_eof = window.hit_eof();

        source.seek(start)?;

        let mut gathered = Gathered {
            lines,
            hit_eof,
            ..Default::default()
        };
        for partial in partials {
            gathered.merge(partial?);
        }

        debug!(keys = gathered.keys.len(), lines = lines, skipped = gathered.skipped; "gathered keys");
        Ok(gathered)
    }

    fn scan<R: BufRead + Seek>(&self, window: &Window<'_, R>) -> io::Result<Gathered> {
        let mut partial = Gathered::default();
        let mut instance = K::Instance::default();
        let mut chunk = Vec::new();

        while window.next_chunk(&mut chunk)? {
            for line in &chunk {
                match self.kernel.parse(line, &mut instance) {
                    Ok(true) => self.kernel.for_each_key(&instance, |key| {
                        partial.keys.insert(key);
                        *partial.freq.entry(key).or_default() += 1;
                    }),
                    Ok(false) => {}
                    Err(e) => {
                        warn!("skipping line: {e}");
                        partial.skipped += 1;
                    }
                }
            }
        }

        Ok(partial)
    }
}
