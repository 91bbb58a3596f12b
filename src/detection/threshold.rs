use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Threshold source resolved for one buffer
#[derive(Debug, Clone, Copy)]
pub enum ThresholdSource<'a> {
    /// Same value for every sample
    Constant(f32),
    /// The provider's current random draw
    Random,
    /// Per-sample values of the reference channel
    Channel(&'a [f32]),
}

/// Yields the threshold each sample is compared against
///
/// Holds the random-mode state: the value in force for the current active
/// period and the generator it is drawn from. A new value is drawn only when
/// [`redraw`](Self::redraw) is called, which the engine does after each onset.
#[derive(Debug, Clone)]
pub struct ThresholdProvider {
    current_random: f32,
    draws: u64,
    rng: ChaCha8Rng,
}

impl ThresholdProvider {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => ChaCha8Rng::seed_from_u64(s),
            None => rand::make_rng(),
        };
        Self {
            current_random: 0.0,
            draws: 0,
            rng,
        }
    }

    /// Threshold for sample `index` of the current buffer
    ///
    /// Channel sources must cover `index`; the engine checks buffer lengths
    /// before it starts iterating.
    pub fn threshold_at(&self, source: &ThresholdSource<'_>, index: usize) -> f32 {
        match source {
            ThresholdSource::Constant(value) => *value,
            ThresholdSource::Random => self.current_random,
            ThresholdSource::Channel(values) => values[index],
        }
    }

    /// Draw a new random threshold uniformly from `[min, max]`
    ///
    /// A degenerate range (`max <= min`) yields `min`, as does one whose
    /// width overflows `f32`.
    pub fn redraw(&mut self, min: f32, max: f32) -> f32 {
        self.current_random = if max > min && (max - min).is_finite() {
            self.rng.random_range(min..=max)
        } else {
            min
        };
        self.draws += 1;
        self.current_random
    }

    pub fn current_random(&self) -> f32 {
        self.current_random
    }

    /// Number of random draws made so far
    pub fn draws(&self) -> u64 {
        self.draws
    }
}
