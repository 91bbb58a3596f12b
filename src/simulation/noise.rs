use rand::RngExt;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{CrossingError, Result};

#[derive(Clone, Debug, Default, serde::Deserialize)]
pub struct NoiseConfig {
    pub seed: Option<u64>,
    pub additive: Option<AdditiveNoiseConfig>,
    pub impulse: Option<ImpulseNoiseConfig>,
    pub jumps: Option<JumpArtifactConfig>,
}

impl NoiseConfig {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_gaussian(mut self, std_dev: f32) -> Self {
        self.additive = Some(AdditiveNoiseConfig { std_dev });
        self
    }

    pub fn with_impulse(mut self, rate_hz: f32, amplitude: f32, duration_samples: usize) -> Self {
        self.impulse = Some(ImpulseNoiseConfig {
            rate_hz,
            amplitude,
            duration_samples,
        });
        self
    }

    pub fn with_jumps(mut self, rate_hz: f32, amplitude: f32) -> Self {
        self.jumps = Some(JumpArtifactConfig { rate_hz, amplitude });
        self
    }
}

/// Zero-mean Gaussian noise
#[derive(Clone, Debug, serde::Deserialize)]
pub struct AdditiveNoiseConfig {
    pub std_dev: f32,
}

/// Short rectangular bursts of random sign
#[derive(Clone, Debug, serde::Deserialize)]
pub struct ImpulseNoiseConfig {
    pub rate_hz: f32,
    pub amplitude: f32,
    pub duration_samples: usize,
}

/// Single-sample step artifacts: the signal jumps by `amplitude` and stays
/// there for one sample, like a recording amplifier saturating
#[derive(Clone, Debug, serde::Deserialize)]
pub struct JumpArtifactConfig {
    pub rate_hz: f32,
    pub amplitude: f32,
}

fn create_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(s) => ChaCha8Rng::seed_from_u64(s),
        None => rand::make_rng(),
    }
}

pub fn signal_power(signal: &[f32]) -> f32 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|&x| x * x).sum::<f32>() / signal.len() as f32
}

/// Apply every configured impairment in place
///
/// Returns the indices at which jump artifacts were inserted.
pub fn apply_noise(signal: &mut [f32], config: &NoiseConfig, sample_rate: f32) -> Result<Vec<usize>> {
    let mut rng = create_rng(config.seed);

    if let Some(ref additive) = config.additive {
        apply_additive_noise(signal, additive, &mut rng)?;
    }
    if let Some(ref impulse) = config.impulse {
        apply_impulse_noise(signal, impulse, sample_rate, &mut rng);
    }
    let jumps = match config.jumps {
        Some(ref jumps) => apply_jump_artifacts(signal, jumps, sample_rate, &mut rng),
        None => Vec::new(),
    };
    Ok(jumps)
}

fn apply_additive_noise(
    signal: &mut [f32],
    config: &AdditiveNoiseConfig,
    rng: &mut ChaCha8Rng,
) -> Result<()> {
    if config.std_dev == 0.0 {
        return Ok(());
    }
    let normal =
        Normal::new(0.0, config.std_dev as f64).map_err(|e| CrossingError::InvalidParameter {
            name: "noise std dev",
            reason: e.to_string(),
        })?;

    for sample in signal.iter_mut() {
        *sample += normal.sample(rng) as f32;
    }
    Ok(())
}

/// Positions spaced on average `sample_rate / rate_hz` apart
fn random_positions(n: usize, rate_hz: f32, sample_rate: f32, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut positions = Vec::new();
    if n == 0 || rate_hz <= 0.0 {
        return positions;
    }
    let avg_interval = sample_rate / rate_hz;
    let mut pos = 0usize;
    loop {
        let interval = (rng.random::<f32>() * 2.0 * avg_interval) as usize;
        pos += interval.max(1);
        if pos >= n {
            break;
        }
        positions.push(pos);
    }
    positions
}

fn apply_impulse_noise(
    signal: &mut [f32],
    config: &ImpulseNoiseConfig,
    sample_rate: f32,
    rng: &mut ChaCha8Rng,
) {
    let n = signal.len();
    for pos in random_positions(n, config.rate_hz, sample_rate, rng) {
        let sign = if rng.random::<bool>() { 1.0 } else { -1.0 };
        let end = (pos + config.duration_samples).min(n);
        for sample in signal[pos..end].iter_mut() {
            *sample += sign * config.amplitude;
        }
    }
}

fn apply_jump_artifacts(
    signal: &mut [f32],
    config: &JumpArtifactConfig,
    sample_rate: f32,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let positions = random_positions(signal.len(), config.rate_hz, sample_rate, rng);
    for &pos in &positions {
        signal[pos] += config.amplitude;
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_seeded_noise_is_reproducible() {
        let config = NoiseConfig::default().with_seed(7).with_gaussian(0.1);
        let mut a = vec![0.0; 256];
        let mut b = vec![0.0; 256];
        apply_noise(&mut a, &config, 1000.0).unwrap();
        apply_noise(&mut b, &config, 1000.0).unwrap();
        assert_eq!(a, b);
        assert!(a.iter().any(|&v| v != 0.0));
    }

    #[test]
    fn test_gaussian_power() {
        let config = NoiseConfig::default().with_seed(1).with_gaussian(0.5);
        let mut signal = vec![0.0; 20_000];
        apply_noise(&mut signal, &config, 1000.0).unwrap();
        assert_abs_diff_eq!(signal_power(&signal), 0.25, epsilon = 0.02);
    }

    #[test]
    fn test_jump_positions_reported() {
        let config = NoiseConfig::default().with_seed(3).with_jumps(20.0, 10.0);
        let mut signal = vec![0.0; 1000];
        let jumps = apply_noise(&mut signal, &config, 1000.0).unwrap();
        assert!(!jumps.is_empty());
        for &j in &jumps {
            assert_eq!(signal[j], 10.0);
        }
    }

    #[test]
    fn test_negative_std_dev_rejected() {
        let config = NoiseConfig::default().with_gaussian(-1.0);
        assert!(apply_noise(&mut [0.0; 4], &config, 1000.0).is_err());
    }
}
