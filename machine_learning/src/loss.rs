/// Running sum of the loss terms reported by a kernel, used for diagnostics only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Loss {
    sum: f64,
    count: u64,
}

impl Loss {
    /// Adds a loss term.
    pub fn accumulate(&mut self, term: f32) {
        self.sum += term as f64;
        self.count += 1;
    }

    /// Merges the terms of another accumulator into this one.
    pub fn merge(&mut self, other: &Loss) {
        self.sum += other.sum;
        self.count += other.count;
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// The average term, zero if nothing was accumulated.
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }

        self.sum / self.count as f64
    }
}
