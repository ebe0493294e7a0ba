//! Seeded pseudo-random stream for the Monte-Carlo box ordering.
//!
//! The stream is `frac(sin(seed) * 10000)` with the seed incremented after
//! every draw. It is cheap and reproducible for a given seed, which is all
//! the ordering noise needs; its statistical quality is poor.

/// Sine-hash generator.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    seed: f64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self { seed: seed as f64 }
    }

    /// Next value in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        let x = self.seed.sin() * 10000.0;
        self.seed += 1.0;
        x - x.floor()
    }

    /// Next value in `[-amplitude, amplitude]`.
    pub fn next_symmetric(&mut self, amplitude: f64) -> f64 {
        (self.next_f64() - 0.5) * 2.0 * amplitude
    }
}
