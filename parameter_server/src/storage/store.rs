use std::{io::Write, num::NonZeroUsize};

use machine_learning::{Key, ParamAccess, initialization::ParamGen};
use parking_lot::Mutex;
use rayon::prelude::*;

use super::ParamShard;
use crate::{Result, SyncErr};

/// The primary storage of a server's parameters, created lazily the first time each
/// key is requested.
///
/// Keys are spread over a fixed set of shards so pulls and pushes touching different
/// shards run in parallel.
pub struct ParamStore<A: ParamAccess> {
    access: A,
    shards: Box<[ParamShard<A>]>,
    param_gen: Mutex<Box<dyn ParamGen + Send>>,
}

impl<A: ParamAccess> ParamStore<A> {
    /// Creates a new empty `ParamStore`.
    ///
    /// # Arguments
    /// * `access` - The model's parameter layout and update rule.
    /// * `shards` - The amount of shards.
    /// * `param_gen` - The generator for the initial values.
    pub fn new(access: A, shards: NonZeroUsize, param_gen: Box<dyn ParamGen + Send>) -> Self {
        Self {
            access,
            shards: (0..shards.get()).map(|_| ParamShard::new()).collect(),
            param_gen: Mutex::new(param_gen),
        }
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    /// The amount of keys stored.
    pub fn len(&self) -> usize {
        self.shards.iter().map(ParamShard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: Key) -> bool {
        self.shard(key).contains(key)
    }

    /// Runs `f` on the record of `key`, if present.
    pub fn with_param<T>(&self, key: Key, f: impl FnOnce(&A::Param) -> T) -> Option<T> {
        self.shard(key).with_param(key, f)
    }

    fn shard_idx(&self, key: Key) -> usize {
        // keys reaching a server share their remainder modulo the amount of servers
        let mixed = key.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 32;
        mixed as usize % self.shards.len()
    }

    fn shard(&self, key: Key) -> &ParamShard<A> {
        &self.shards[self.shard_idx(key)]
    }

    /// Initializes the missing keys, in the order given.
    fn ensure(&self, keys: &[Key]) {
        for &key in keys {
            self.shard(key).get_or_init(key, || {
                let mut param_gen = self.param_gen.lock();
                self.access.init_param(key, &mut **param_gen)
            });
        }
    }

    fn check_size(what: &'static str, got: usize, expected: usize) -> Result<()> {
        if got != expected {
            return Err(SyncErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }

    /// Copies the pull values of `keys` into `out`.
    ///
    /// # Arguments
    /// * `keys` - The requested keys.
    /// * `out` - `pull_width` numbers per key, in the same order as `keys`.
    ///
    /// # Returns
    /// A `SyncErr::SizeMismatch` if `out` doesn't fit exactly one value per key.
    pub fn pull(&self, keys: &[Key], out: &mut [f32]) -> Result<()> {
        let width = self.access.pull_width();
        Self::check_size("pull buffer", out.len(), keys.len() * width)?;
        if keys.is_empty() {
            return Ok(());
        }

        self.ensure(keys);

        let mut groups: Vec<Vec<_>> = (0..self.shards.len()).map(|_| Vec::new()).collect();
        for (&key, chunk) in keys.iter().zip(out.chunks_exact_mut(width)) {
            groups[self.shard_idx(key)].push((key, chunk));
        }

        self.shards
            .par_iter()
            .zip(groups.into_par_iter())
            .for_each(|(shard, group)| shard.pull(&self.access, group.into_iter()));

        Ok(())
    }

    /// Applies the update rule of the model to every key in `keys`.
    ///
    /// # Arguments
    /// * `keys` - The pushed keys.
    /// * `grads` - `push_width` numbers per key, in the same order as `keys`.
    ///
    /// # Returns
    /// A `SyncErr::SizeMismatch` if `grads` doesn't hold exactly one gradient per key.
    pub fn push(&self, keys: &[Key], grads: &[f32]) -> Result<()> {
        let width = self.access.push_width();
        Self::check_size("pushed gradients", grads.len(), keys.len() * width)?;
        if keys.is_empty() {
            return Ok(());
        }

        self.ensure(keys);

        let mut groups: Vec<Vec<_>> = (0..self.shards.len()).map(|_| Vec::new()).collect();
        for (&key, chunk) in keys.iter().zip(grads.chunks_exact(width)) {
            groups[self.shard_idx(key)].push((key, chunk));
        }

        self.shards
            .par_iter()
            .zip(groups.into_par_iter())
            .for_each(|(shard, group)| shard.push(&self.access, group.into_iter()));

        Ok(())
    }

    /// Writes every stored parameter sorted by key, one `key<TAB>encoding` per line.
    ///
    /// # Arguments
    /// * `out` - The destination writer.
    pub fn dump<W: Write>(&self, out: &mut W) -> std::io::Result<()> {
        let mut keys: Vec<_> = self.shards.iter().flat_map(ParamShard::keys).collect();
        keys.sort_unstable();

        for key in keys {
            let written = self.with_param(key, |param| -> std::io::Result<()> {
                write!(out, "{key}\t")?;
                self.access.write_param(param, out)?;
                writeln!(out)
            });

            if let Some(res) = written {
                res?;
            }
        }

        out.flush()
    }
}
