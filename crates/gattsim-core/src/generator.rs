//! Seeded generator for the simulated sensor readings.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::ValueRange;

/// One generated set of readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// Heart rate in beats per minute.
    pub heart_rate: u8,
    /// Temperature in hundredths of a degree Celsius.
    pub temperature_raw: i32,
}

/// Draws heart rate and temperature uniformly from inclusive ranges.
#[derive(Debug, Clone)]
pub struct ValueGenerator {
    rng: StdRng,
    heart_rate: (u8, u8),
    temperature: ValueRange,
}

impl ValueGenerator {
    /// Creates a generator. Without a seed the generator is seeded from entropy.
    ///
    /// The heart rate range is clamped to `0..=255` and reordered if inverted.
    #[must_use]
    pub fn new(seed: Option<u64>, heart_rate: ValueRange, temperature: ValueRange) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        let clamp = |v: i32| u8::try_from(v.clamp(0, i32::from(u8::MAX))).unwrap_or(u8::MAX);
        let (lo, hi) = (clamp(heart_rate.min()), clamp(heart_rate.max()));
        let temperature = ValueRange(
            temperature.min().min(temperature.max()),
            temperature.min().max(temperature.max()),
        );
        Self {
            rng,
            heart_rate: (lo.min(hi), lo.max(hi)),
            temperature,
        }
    }

    /// Draws the next reading.
    pub fn next_reading(&mut self) -> Reading {
        Reading {
            heart_rate: self.rng.gen_range(self.heart_rate.0..=self.heart_rate.1),
            temperature_raw: self
                .rng
                .gen_range(self.temperature.min()..=self.temperature.max()),
        }
    }
}
