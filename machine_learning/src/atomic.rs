use std::sync::atomic::{AtomicU32, Ordering};

/// An `f32` that many threads can accumulate into.
///
/// The value is kept as its bit pattern, additions go through a compare and swap
/// loop so no contribution is lost under contention.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicF32 {
    bits: AtomicU32,
}

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self {
            bits: AtomicU32::new(value.to_bits()),
        }
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Adds `x` and returns the previous value.
    pub fn fetch_add(&self, x: f32) -> f32 {
        let mut current = self.bits.load(Ordering::Relaxed);

        loop {
            let new = (f32::from_bits(current) + x).to_bits();

            match self
                .bits
                .compare_exchange_weak(current, new, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(prev) => return f32::from_bits(prev),
                Err(actual) => current = actual,
            }
        }
    }
}

/// Allocates `len` zeroed accumulators.
pub fn zeroed_slice(len: usize) -> Box<[AtomicF32]> {
    (0..len).map(|_| AtomicF32::default()).collect()
}

/// Accumulates `scale * v` elementwise into `acc`.
///
/// # Panics
/// If the lengths differ.
pub fn axpy(acc: &[AtomicF32], scale: f32, v: &[f32]) {
    assert_eq!(acc.len(), v.len());

    for (a, x) in acc.iter().zip(v) {
        a.fetch_add(scale * x);
    }
}
