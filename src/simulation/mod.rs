//! Deterministic synthetic signals for exercising the detector.

mod noise;
mod signal;

pub use noise::{
    AdditiveNoiseConfig, ImpulseNoiseConfig, JumpArtifactConfig, NoiseConfig, apply_noise,
    signal_power,
};
pub use signal::{
    TestSignal, generate_reference_sine, generate_sine_wave, generate_square_wave,
    generate_step_signal,
};
