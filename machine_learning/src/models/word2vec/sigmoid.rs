/// Precomputed logistic function over `[-MAX_EXP, MAX_EXP]`, saturating outside.
#[derive(Debug, Clone)]
pub struct SigmoidTable {
    table: Box<[f32]>,
}

impl SigmoidTable {
    pub const SIZE: usize = 1000;
    pub const MAX_EXP: f32 = 6.0;

    pub fn new() -> Self {
        let table = (0..=Self::SIZE)
            .map(|i| {
                let e = ((i as f32 / Self::SIZE as f32 * 2.0 - 1.0) * Self::MAX_EXP).exp();
                e / (e + 1.0)
            })
            .collect();

        Self { table }
    }

    /// Looks up `sigmoid(x)`, `1` above `MAX_EXP` and `0` below `-MAX_EXP`.
    pub fn eval(&self, x: f32) -> f32 {
        if x > Self::MAX_EXP {
            1.0
        } else if x < -Self::MAX_EXP {
            0.0
        } else {
            let i = ((x + Self::MAX_EXP) * (Self::SIZE as f32 / Self::MAX_EXP / 2.0)) as usize;
            self.table[i.min(Self::SIZE)]
        }
    }
}

impl Default for SigmoidTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates() {
        let table = SigmoidTable::new();
        assert_eq!(table.eval(6.5), 1.0);
        assert_eq!(table.eval(-100.0), 0.0);
    }

    #[test]
    fn close_to_exact() {
        let table = SigmoidTable::new();
        for x in [-5.9f32, -2.0, -0.3, 0.0, 0.7, 3.3, 6.0] {
            let exact = 1.0 / (1.0 + (-x).exp());
            assert!((table.eval(x) - exact).abs() < 0.01, "x = {x}");
        }
    }
}
