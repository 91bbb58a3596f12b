use std::f32::consts::PI;

/// Synthetic signal with the indices of its known rising and falling crossings
#[derive(Debug, Clone, Default)]
pub struct TestSignal {
    pub samples: Vec<f32>,
    /// First sample above the mid level after each low-to-high transition
    pub rising: Vec<usize>,
    /// First sample at or below the mid level after each high-to-low transition
    pub falling: Vec<usize>,
}

/// Square wave alternating between `low` and `high`, starting low
///
/// `period` samples per cycle, half of them high.
pub fn generate_square_wave(num_samples: usize, period: usize, low: f32, high: f32) -> TestSignal {
    let period = period.max(2);
    let half = period / 2;
    let mut signal = TestSignal {
        samples: Vec::with_capacity(num_samples),
        ..TestSignal::default()
    };

    for i in 0..num_samples {
        let phase = i % period;
        let is_high = phase >= half;
        if i > 0 && phase == half {
            signal.rising.push(i);
        }
        if i > 0 && phase == 0 {
            signal.falling.push(i);
        }
        signal.samples.push(if is_high { high } else { low });
    }
    signal
}

/// Piecewise-constant signal: `levels[k]` holds from `steps[k]` until the next step
///
/// Crossings are reported relative to `threshold`.
pub fn generate_step_signal(
    num_samples: usize,
    steps: &[(usize, f32)],
    threshold: f32,
) -> TestSignal {
    let mut signal = TestSignal {
        samples: vec![0.0; num_samples],
        ..TestSignal::default()
    };
    let mut level = steps.first().map_or(0.0, |&(_, v)| v);
    let mut next = 0;

    for i in 0..num_samples {
        while next < steps.len() && steps[next].0 <= i {
            level = steps[next].1;
            next += 1;
        }
        signal.samples[i] = level;
        if i > 0 {
            let prev = signal.samples[i - 1];
            if prev <= threshold && level > threshold {
                signal.rising.push(i);
            } else if prev > threshold && level <= threshold {
                signal.falling.push(i);
            }
        }
    }
    signal
}

/// Sine wave of `frequency_hz` and `amplitude`
pub fn generate_sine_wave(
    num_samples: usize,
    sample_rate: f32,
    frequency_hz: f32,
    amplitude: f32,
) -> Vec<f32> {
    (0..num_samples)
        .map(|i| amplitude * (2.0 * PI * frequency_hz * i as f32 / sample_rate).sin())
        .collect()
}

/// Slowly varying threshold for a reference channel: `offset` plus a sine
pub fn generate_reference_sine(
    num_samples: usize,
    sample_rate: f32,
    frequency_hz: f32,
    offset: f32,
    amplitude: f32,
) -> Vec<f32> {
    generate_sine_wave(num_samples, sample_rate, frequency_hz, amplitude)
        .into_iter()
        .map(|v| v + offset)
        .collect()
}
