use log::debug;
use rand::Rng;

use crate::{FrequencyTable, Key, MlErr, Result};

/// A fixed-size array of keys where each key appears roughly `freq^0.75` times,
/// so a uniform index draw is a frequency weighted key draw.
///
/// The storage is allocated by the first `rebuild` and refilled in place afterwards.
#[derive(Debug, Clone, Default)]
pub struct UnigramTable {
    table: Vec<Key>,
}

impl UnigramTable {
    const POWER: f64 = 0.75;

    /// Builds a new `UnigramTable`.
    ///
    /// # Arguments
    /// * `freq` - The occurrences of every key, it's not modified.
    /// * `size` - The amount of slots of the table.
    ///
    /// # Returns
    /// An `MlErr::EmptyFrequencyTable` if there's nothing to sample from.
    pub fn build(freq: &FrequencyTable, size: usize) -> Result<Self> {
        let mut table = Self::default();
        table.rebuild(freq, size)?;
        Ok(table)
    }

    /// Refills the table with the keys of `freq`, reusing its storage.
    ///
    /// # Arguments
    /// * `freq` - The occurrences of every key, it's not modified.
    /// * `size` - The amount of slots of the table.
    ///
    /// # Returns
    /// An `MlErr::EmptyFrequencyTable` if there's nothing to sample from, the table is
    /// left empty in that case.
    pub fn rebuild(&mut self, freq: &FrequencyTable, size: usize) -> Result<()> {
        self.table.clear();
        if freq.is_empty() || size == 0 {
            return Err(MlErr::EmptyFrequencyTable);
        }

        let mut ids: Vec<_> = freq.iter().map(|(&key, &count)| (key, count)).collect();
        ids.sort_unstable_by_key(|&(key, _)| key);

        let weight = |count: u64| (count as f64).powf(Self::POWER);
        let total: f64 = ids.iter().map(|&(_, count)| weight(count)).sum();

        let fresh = self.table.capacity() < size;
        self.table.reserve_exact(size);

        let mut i = 0;
        let mut d1 = weight(ids[i].1) / total;

        for a in 0..size {
            self.table.push(ids[i].0);
            if a as f64 / size as f64 > d1 && i + 1 < ids.len() {
                i += 1;
                d1 += weight(ids[i].1) / total;
            }
        }

        debug!(keys = ids.len(), slots = size, fresh = fresh; "built unigram table");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Draws a key.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Key {
        self.table[rng.random_range(0..self.table.len())]
    }
}
