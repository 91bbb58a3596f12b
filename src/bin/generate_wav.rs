use anyhow::{Context, Result};
use clap::Parser;
use crossing_detector::save_wav;
use crossing_detector::simulation::{
    AdditiveNoiseConfig, ImpulseNoiseConfig, JumpArtifactConfig, NoiseConfig, apply_noise,
    generate_reference_sine, generate_square_wave,
};
use crossing_detector::wav::interleave;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "generate_wav")]
#[command(about = "Generate synthetic WAV files with known threshold crossings")]
struct Args {
    /// TOML noise configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "data/synthetic")]
    output_dir: PathBuf,

    /// Square wave periods in ms: comma-separated (e.g., "10,25,50") or range (e.g., "10-50:10")
    #[arg(short, long, default_value = "10-50:10")]
    periods: String,

    /// Number of trials per period
    #[arg(short, long, default_value_t = 3)]
    trials: u32,

    /// Base seed for reproducibility
    #[arg(short, long)]
    seed: Option<u64>,

    /// Signal duration in seconds
    #[arg(short, long, default_value_t = 1.0)]
    duration: f32,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 30000)]
    sample_rate: u32,

    /// Square wave amplitude (low = -amplitude, high = +amplitude)
    #[arg(long, default_value_t = 1.0)]
    amplitude: f32,

    /// Frequency of the reference-channel threshold sine in Hz
    #[arg(long, default_value_t = 0.5)]
    reference_hz: f32,

    /// Peak deviation of the reference-channel threshold
    #[arg(long, default_value_t = 0.25)]
    reference_amplitude: f32,

    /// Output filename prefix
    #[arg(long, default_value = "synth")]
    prefix: String,

    /// Generate manifest.json with the true crossing positions
    #[arg(long)]
    manifest: bool,

    /// Gaussian noise standard deviation (CLI override)
    #[arg(long)]
    noise: Option<f32>,

    /// Jump artifact rate in Hz (CLI override)
    #[arg(long)]
    jump_rate: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    gaussian: Option<GaussianSection>,
    impulse: Option<ImpulseSection>,
    jumps: Option<JumpSection>,
}

#[derive(Debug, Deserialize)]
struct GaussianSection {
    std_dev: f32,
}

#[derive(Debug, Deserialize)]
struct ImpulseSection {
    rate_hz: f32,
    amplitude: f32,
    duration_samples: usize,
}

#[derive(Debug, Deserialize)]
struct JumpSection {
    rate_hz: f32,
    amplitude: f32,
}

#[derive(Debug, serde::Serialize)]
struct ManifestEntry {
    file: String,
    period_ms: f32,
    trial: u32,
    seed: u64,
    rising: Vec<usize>,
    falling: Vec<usize>,
    jumps: Vec<usize>,
}

#[derive(Debug, serde::Serialize)]
struct Manifest {
    sample_rate: u32,
    duration: f32,
    channels: u16,
    files: Vec<ManifestEntry>,
}

fn parse_periods(s: &str) -> Result<Vec<f32>> {
    if s.contains(':') {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 2 {
            anyhow::bail!("Invalid range format. Use 'start-end:step'");
        }
        let step: f32 = parts[1].parse().context("Invalid step value")?;
        if step <= 0.0 {
            anyhow::bail!("Step must be positive");
        }
        let range_parts: Vec<&str> = parts[0].split('-').collect();
        if range_parts.len() != 2 {
            anyhow::bail!("Invalid range format. Use 'start-end:step'");
        }
        let start: f32 = range_parts[0].parse().context("Invalid start value")?;
        let end: f32 = range_parts[1].parse().context("Invalid end value")?;

        let mut periods = Vec::new();
        let mut p = start;
        while p <= end {
            periods.push(p);
            p += step;
        }
        Ok(periods)
    } else {
        s.split(',')
            .map(|p| p.trim().parse::<f32>().context("Invalid period value"))
            .collect()
    }
}

fn load_toml_config(path: &PathBuf) -> Result<TomlConfig> {
    let content = fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&content).context("Failed to parse config file")
}

fn build_noise_config(toml: &TomlConfig, args: &Args, seed: u64) -> NoiseConfig {
    let mut config = NoiseConfig::default().with_seed(seed);

    if let Some(std_dev) = args.noise {
        config.additive = Some(AdditiveNoiseConfig { std_dev });
    } else if let Some(ref gaussian) = toml.gaussian {
        config.additive = Some(AdditiveNoiseConfig {
            std_dev: gaussian.std_dev,
        });
    }

    if let Some(ref impulse) = toml.impulse {
        config.impulse = Some(ImpulseNoiseConfig {
            rate_hz: impulse.rate_hz,
            amplitude: impulse.amplitude,
            duration_samples: impulse.duration_samples,
        });
    }

    if let Some(rate_hz) = args.jump_rate {
        config.jumps = Some(JumpArtifactConfig {
            rate_hz,
            amplitude: 10.0 * args.amplitude,
        });
    } else if let Some(ref jumps) = toml.jumps {
        config.jumps = Some(JumpArtifactConfig {
            rate_hz: jumps.rate_hz,
            amplitude: jumps.amplitude,
        });
    }

    config
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::init();

    fs::create_dir_all(&args.output_dir).context("Failed to create output directory")?;

    let toml_config = if let Some(ref config_path) = args.config {
        load_toml_config(config_path)?
    } else {
        TomlConfig::default()
    };

    let periods = parse_periods(&args.periods)?;
    let base_seed = args.seed.unwrap_or(0);
    let sample_rate = args.sample_rate as f32;
    let num_samples = (args.duration * sample_rate) as usize;

    let mut manifest_entries = Vec::new();
    let total_files = periods.len() * args.trials as usize;
    let mut file_count = 0;

    for &period_ms in &periods {
        let period = ((period_ms / 1000.0) * sample_rate).round() as usize;
        for trial in 0..args.trials {
            let seed = base_seed + trial as u64 * 1000 + period_ms as u64;
            let noise_config = build_noise_config(&toml_config, &args, seed);

            let mut signal =
                generate_square_wave(num_samples, period, -args.amplitude, args.amplitude);
            let jumps = apply_noise(&mut signal.samples, &noise_config, sample_rate)?;
            let reference = generate_reference_sine(
                num_samples,
                sample_rate,
                args.reference_hz,
                0.0,
                args.reference_amplitude,
            );

            let filename = format!("{}_p{:03}_t{:02}.wav", args.prefix, period_ms as i32, trial);
            let filepath = args.output_dir.join(&filename);
            let filepath = filepath
                .to_str()
                .with_context(|| format!("Non UTF-8 path: {}", filepath.display()))?;

            let interleaved = interleave(&[signal.samples, reference]);
            save_wav(filepath, &interleaved, 2, args.sample_rate)
                .context("Failed to write WAV file")?;
            log::debug!("{}: {} rising edges, {} jumps", filename, signal.rising.len(), jumps.len());

            manifest_entries.push(ManifestEntry {
                file: filename,
                period_ms,
                trial,
                seed,
                rising: signal.rising,
                falling: signal.falling,
                jumps,
            });

            file_count += 1;
            eprint!("\rGenerating: {}/{}", file_count, total_files);
        }
    }
    eprintln!();

    if args.manifest {
        let manifest = Manifest {
            sample_rate: args.sample_rate,
            duration: args.duration,
            channels: 2,
            files: manifest_entries,
        };
        let manifest_path = args.output_dir.join("manifest.json");
        let manifest_json =
            serde_json::to_string_pretty(&manifest).context("Failed to serialize manifest")?;
        fs::write(&manifest_path, manifest_json).context("Failed to write manifest")?;
        eprintln!("Manifest written to: {}", manifest_path.display());
    }

    eprintln!(
        "Generated {} files in {}",
        total_files,
        args.output_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_periods_comma_separated() {
        let periods = parse_periods("10, 25,50").unwrap();
        assert_eq!(periods, vec![10.0, 25.0, 50.0]);
    }

    #[test]
    fn test_parse_periods_range() {
        let periods = parse_periods("10-40:10").unwrap();
        assert_eq!(periods, vec![10.0, 20.0, 30.0, 40.0]);
    }

    #[test]
    fn test_parse_periods_rejects_zero_step() {
        assert!(parse_periods("10-40:0").is_err());
    }
}
