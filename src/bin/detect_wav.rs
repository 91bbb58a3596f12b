use anyhow::Context;
use clap::Parser;
use rolling_stats::Stats;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crossing_detector::audio::{ChannelBuffers, SampleSource, WavFileSource};
use crossing_detector::config::{DetectorArgs, DetectorConfig};
use crossing_detector::output::{EventOutput, create_formatter};
use crossing_detector::{CrossingDetector, EmittedEvent, StreamBuffer, StreamInfo};

const STREAM_ID: u16 = 0;

#[derive(Parser, Debug)]
#[command(name = "detect_wav")]
#[command(about = "Run the crossing detector over WAV files and summarize the events", long_about = None)]
struct Args {
    /// WAV files to analyze
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    detector: DetectorArgs,

    /// Output format: text, csv, json
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: SummaryFormat,

    /// Frames per processing buffer
    #[arg(long, default_value_t = 1024)]
    chunk_size: usize,

    /// Print every event instead of a per-file summary
    #[arg(long)]
    events: bool,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum SummaryFormat {
    Text,
    Csv,
    Json,
}

impl From<SummaryFormat> for crossing_detector::output::OutputFormat {
    fn from(format: SummaryFormat) -> Self {
        match format {
            SummaryFormat::Text => Self::Text,
            SummaryFormat::Csv => Self::Csv,
            SummaryFormat::Json => Self::Json,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct StatsSummary {
    count: usize,
    mean: f32,
    std_dev: f32,
    min: f32,
    max: f32,
}

impl StatsSummary {
    fn from_stats(stats: &Stats<f32>) -> Option<Self> {
        if stats.count == 0 {
            return None;
        }
        Some(Self {
            count: stats.count,
            mean: stats.mean,
            std_dev: stats.std_dev,
            min: stats.min,
            max: stats.max,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize)]
struct FileAnalysis {
    filename: String,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    rising: usize,
    falling: usize,
    interval_ms: Option<StatsSummary>,
    crossing_level: Option<StatsSummary>,
    threshold: Option<StatsSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let config = args.detector.resolve().context("invalid detector configuration")?;

    let mut results = Vec::new();
    for path in &args.files {
        results.push(analyze_file(path, &config, &args));
    }

    if args.events {
        return Ok(());
    }

    match args.format {
        SummaryFormat::Text => print_text(&results, &config),
        SummaryFormat::Csv => print_csv(&results),
        SummaryFormat::Json => print_json(&results)?,
    }

    Ok(())
}

fn analyze_file(path: &Path, config: &DetectorConfig, args: &Args) -> FileAnalysis {
    let filename = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    match analyze_file_impl(path, config, args) {
        Ok(mut analysis) => {
            analysis.filename = filename;
            analysis
        }
        Err(e) => FileAnalysis {
            filename,
            error: Some(format!("{:#}", e)),
            ..FileAnalysis::default()
        },
    }
}

fn analyze_file_impl(
    path: &Path,
    config: &DetectorConfig,
    args: &Args,
) -> anyhow::Result<FileAnalysis> {
    let mut source = WavFileSource::new(path, args.chunk_size)
        .with_context(|| format!("reading {}", path.display()))?;
    let sample_rate = source.sample_rate();
    let channels = source.channels();
    log::info!(
        "{}: {} frames, {} channel(s) at {} Hz",
        path.display(),
        source.frames(),
        channels,
        sample_rate
    );

    let mut detector = CrossingDetector::new(config.clone())?;
    detector.update_streams(&[StreamInfo::new(
        STREAM_ID,
        sample_rate as f32,
        channels as usize,
    )])?;
    detector.start_acquisition()?;

    let formatter = create_formatter(args.format.into(), args.verbose > 0);
    if args.events
        && let Some(header) = formatter.header()
    {
        println!("{}", header);
    }

    let mut analysis = FileAnalysis {
        sample_rate,
        channels,
        frames: source.frames(),
        ..FileAnalysis::default()
    };
    let mut interval_stats: Stats<f32> = Stats::new();
    let mut level_stats: Stats<f32> = Stats::new();
    let mut threshold_stats: Stats<f32> = Stats::new();
    let mut last_onset: Option<i64> = None;

    let mut buffers = ChannelBuffers::new(channels as usize);
    let mut events: Vec<EmittedEvent> = Vec::new();

    while let Some(block) = source.next_buffer()? {
        buffers.push_block(&block);
        let slices = buffers.channel_slices();
        let buffer = StreamBuffer::new(buffers.first_sample(), &slices)?;

        events.clear();
        detector.process(STREAM_ID, &buffer, &mut events)?;

        for emitted in &events {
            let event = &emitted.event;
            if args.events {
                let output = EventOutput {
                    event,
                    sample_rate: sample_rate as f32,
                };
                println!("{}", formatter.format(&output));
            }
            if !event.is_onset() {
                continue;
            }
            if event.direction.is_rising() {
                analysis.rising += 1;
            } else {
                analysis.falling += 1;
            }
            if let Some(previous) = last_onset {
                let ms = (event.crossing_point - previous) as f32 * 1000.0 / sample_rate as f32;
                interval_stats.update(ms);
            }
            last_onset = Some(event.crossing_point);
            level_stats.update(event.crossing_level);
            threshold_stats.update(event.threshold);
        }
    }
    detector.stop_acquisition();

    analysis.interval_ms = StatsSummary::from_stats(&interval_stats);
    analysis.crossing_level = StatsSummary::from_stats(&level_stats);
    analysis.threshold = StatsSummary::from_stats(&threshold_stats);
    Ok(analysis)
}

fn print_text(results: &[FileAnalysis], config: &DetectorConfig) {
    eprintln!(
        "Input channel {}, threshold mode {:?}, spans {}/{}, timeout {} ms",
        config.channels.input,
        config.threshold.mode,
        config.voting.past_span,
        config.voting.future_span,
        config.timing.timeout_ms
    );
    eprintln!();

    println!(
        "{:<50} {:>8} {:>8} {:>12} {:>10} {:>10}",
        "File", "Rising", "Falling", "Interval ms", "Std", "Frames"
    );
    println!("{}", "-".repeat(103));

    for result in results {
        if let Some(ref err) = result.error {
            println!("{:<50} ERROR: {}", result.filename, err);
            continue;
        }

        let interval_mean = result
            .interval_ms
            .as_ref()
            .map(|s| format!("{:.2}", s.mean))
            .unwrap_or_else(|| "-".to_string());
        let interval_std = result
            .interval_ms
            .as_ref()
            .map(|s| format!("{:.2}", s.std_dev))
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:<50} {:>8} {:>8} {:>12} {:>10} {:>10}",
            result.filename,
            result.rising,
            result.falling,
            interval_mean,
            interval_std,
            result.frames
        );
    }

    for result in results {
        if let Some(ref level) = result.crossing_level {
            eprintln!();
            eprintln!("Crossing levels for {}:", result.filename);
            eprintln!("  Mean: {:.4}", level.mean);
            eprintln!("  Std dev: {:.4}", level.std_dev);
            eprintln!("  Range: {:.4} .. {:.4}", level.min, level.max);
        }
        if let Some(ref threshold) = result.threshold
            && threshold.max > threshold.min
        {
            eprintln!(
                "  Thresholds: {:.4} .. {:.4} (mean {:.4})",
                threshold.min, threshold.max, threshold.mean
            );
        }
    }
}

fn print_csv(results: &[FileAnalysis]) {
    println!(
        "filename,sample_rate,channels,frames,rising,falling,interval_mean_ms,interval_std_ms,level_mean,threshold_mean,error"
    );
    for result in results {
        let interval_mean = result
            .interval_ms
            .as_ref()
            .map(|s| format!("{:.4}", s.mean))
            .unwrap_or_default();
        let interval_std = result
            .interval_ms
            .as_ref()
            .map(|s| format!("{:.4}", s.std_dev))
            .unwrap_or_default();
        let level_mean = result
            .crossing_level
            .as_ref()
            .map(|s| format!("{:.4}", s.mean))
            .unwrap_or_default();
        let threshold_mean = result
            .threshold
            .as_ref()
            .map(|s| format!("{:.4}", s.mean))
            .unwrap_or_default();
        let error = result.error.as_deref().unwrap_or("");

        println!(
            "{},{},{},{},{},{},{},{},{},{},{}",
            result.filename,
            result.sample_rate,
            result.channels,
            result.frames,
            result.rising,
            result.falling,
            interval_mean,
            interval_std,
            level_mean,
            threshold_mean,
            error
        );
    }
}

fn print_json(results: &[FileAnalysis]) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    println!("{}", json);
    Ok(())
}
