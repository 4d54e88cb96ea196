use std::ops::RangeInclusive;

use comms::specs::machine_learning::Word2VecSpec;
use rand::Rng;

use super::{SigmoidTable, UnigramTable, Word2VecAccess};
use crate::{FrequencyTable, Key, Kernel, LocalParamCache, Loss, Result};

/// Scale of the diagnostic loss terms.
const LOSS_SCALE: f32 = 10_000.0;

/// Hashes a token into its key, collisions are accepted.
pub fn token_key(token: &str) -> Key {
    const SEED: Key = 131;

    token
        .bytes()
        .fold(0, |hash: Key, b| hash.wrapping_mul(SEED).wrapping_add(b as Key))
}

/// One sentence of the skip-gram training data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Word2VecInstance {
    pub words: Vec<Key>,
}

/// Skip-gram with negative sampling.
///
/// Each line is a whitespace separated sentence, negatives are only drawn from the
/// words of the current round.
#[derive(Debug, Clone)]
pub struct Word2VecKernel {
    access: Word2VecAccess,
    spec: Word2VecSpec,
    sigmoid: SigmoidTable,
}

impl Word2VecKernel {
    /// Creates a new `Word2VecKernel`.
    ///
    /// # Arguments
    /// * `spec` - The model's specification.
    /// * `learning_rate` - The server-side learning rate.
    pub fn new(spec: Word2VecSpec, learning_rate: f32) -> Self {
        Self {
            access: Word2VecAccess::new(spec.dim, learning_rate, spec.update_target),
            spec,
            sigmoid: SigmoidTable::new(),
        }
    }

    /// The positions around `pos` within `radius`, `pos` itself included.
    fn context(pos: usize, radius: usize, len: usize) -> RangeInclusive<usize> {
        pos.saturating_sub(radius)..=(pos + radius).min(len - 1)
    }

    fn draw_negative<R: Rng + ?Sized>(table: &UnigramTable, rng: &mut R) -> Key {
        match table.sample(rng) {
            0 => table.sample(rng),
            target => target,
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

impl Kernel for Word2VecKernel {
    type Access = Word2VecAccess;
    type Instance = Word2VecInstance;
    type Round = UnigramTable;

    fn access(&self) -> Self::Access {
        self.access
    }

    fn parse(&self, line: &str, instance: &mut Self::Instance) -> Result<bool> {
        instance.words.clear();
        instance
            .words
            .extend(line.split_whitespace().map(token_key));

        let len = instance.words.len();
        Ok(len > 0 && len >= self.spec.min_sentence_length)
    }

    fn for_each_key(&self, instance: &Self::Instance, f: impl FnMut(Key)) {
        instance.words.iter().copied().for_each(f);
    }

    fn prepare_round(&self, freq: &FrequencyTable, table: &mut Self::Round) -> Result<()> {
        table.rebuild(freq, self.spec.table_size)
    }

    fn learn<R: Rng + ?Sized>(
        &self,
        instance: &Self::Instance,
        table: &Self::Round,
        cache: &LocalParamCache<Self::Access>,
        rng: &mut R,
        loss: &mut Loss,
    ) {
        let Word2VecSpec {
            dim,
            window,
            negative,
            learning_rate: alpha,
            ..
        } = self.spec;
        let words = &instance.words;

        let mut neu1 = vec![0.0; dim];
        let mut neu1e = vec![0.0; dim];

        for (pos, &word) in words.iter().enumerate() {
            let shrink = if window > 0 { rng.random_range(0..window) } else { 0 };
            let context = Self::context(pos, window - shrink, words.len());

            neu1.fill(0.0);
            neu1e.fill(0.0);

            for c in context.clone().filter(|&c| c != pos) {
                let output = &cache.param(words[c]).output;
                neu1.iter_mut().zip(output).for_each(|(n, o)| *n += o);
            }

            for d in 0..=negative {
                let (target, label) = if d == 0 {
                    (word, 1.0)
                } else {
                    let target = Self::draw_negative(table, rng);
                    if target == word {
                        continue;
                    }
                    (target, 0.0)
                };

                let hidden = &cache.param(target).hidden;
                let f = dot(&neu1, hidden);
                let g = (label - self.sigmoid.eval(f)) * alpha;
                loss.accumulate(LOSS_SCALE * g * g);

                neu1e.iter_mut().zip(hidden).for_each(|(e, h)| *e += g * h);
                cache.grad(target).accu_hidden(g, &neu1);
            }

            for c in context.filter(|&c| c != pos) {
                cache.grad(words[c]).accu_output(&neu1e);
            }
        }
    }
}
