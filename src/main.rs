use anyhow::Context;
use clap::Parser;
use std::time::{Duration, Instant};

use crossing_detector::audio::{ChannelBuffers, DeviceSource, SampleSource};
use crossing_detector::config::{AudioConfig, DetectorArgs};
use crossing_detector::output::{EventOutput, OutputFormat, create_formatter};
use crossing_detector::{CrossingDetector, EmittedEvent, StreamBuffer, StreamInfo};

const STREAM_ID: u16 = 0;

#[derive(Parser, Debug)]
#[command(name = "crossing-detector")]
#[command(about = "Detect threshold crossings on a live audio input", long_about = None)]
struct Args {
    #[command(flatten)]
    detector: DetectorArgs,

    /// Output format: text, json, csv
    #[arg(short = 'f', long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Sample rate in Hz
    #[arg(long, default_value_t = 48000)]
    sample_rate: u32,

    /// Number of input channels to capture
    #[arg(long, default_value_t = 2)]
    channels: u16,

    /// Frames per buffer
    #[arg(long, default_value_t = 1024)]
    buffer_size: usize,

    /// Print offsets as well as onsets
    #[arg(long)]
    offsets: bool,

    /// Increase output verbosity
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
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
    let audio = AudioConfig {
        sample_rate: args.sample_rate,
        buffer_size: args.buffer_size,
        channels: args.channels,
    };

    println!("=== Crossing Detector ===");
    println!("Sample rate: {} Hz", audio.sample_rate);
    println!(
        "Input channel: {}, threshold mode: {:?}",
        config.channels.input, config.threshold.mode
    );
    println!(
        "Voting spans: {} past / {} future, timeout {} ms",
        config.voting.past_span, config.voting.future_span, config.timing.timeout_ms
    );
    println!();

    let mut detector = CrossingDetector::new(config)?;
    detector.update_streams(&[StreamInfo::new(
        STREAM_ID,
        audio.sample_rate as f32,
        audio.channels as usize,
    )])?;
    detector.start_acquisition()?;
    println!("Threshold: {}", detector.threshold_display(STREAM_ID));

    println!("Starting audio capture...");
    let source = DeviceSource::new(&audio)?;
    println!("Audio capture started. Processing...\n");

    run_processing_loop(source, detector, &args)
}

fn run_processing_loop(
    mut source: impl SampleSource,
    mut detector: CrossingDetector,
    args: &Args,
) -> anyhow::Result<()> {
    let formatter = create_formatter(args.format, args.verbose > 0);
    if let Some(header) = formatter.header() {
        println!("{}", header);
    }

    let sample_rate = source.sample_rate() as f32;
    let mut buffers = ChannelBuffers::new(source.channels() as usize);
    let mut events: Vec<EmittedEvent> = Vec::new();
    let mut last_activity = Instant::now();

    while let Some(block) = source.next_buffer()? {
        if block.gap_frames > 0 {
            // history from before the gap must not be compared with what follows
            log::warn!(
                "Lost {} frames ({:.1} ms) of input, restarting detection",
                block.gap_frames,
                block.gap_frames as f32 * 1000.0 / sample_rate
            );
            detector.stop_acquisition();
            detector.start_acquisition()?;
        }
        buffers.push_block(&block);
        let slices = buffers.channel_slices();
        let buffer = StreamBuffer::new(buffers.first_sample(), &slices)?;

        events.clear();
        detector.process(STREAM_ID, &buffer, &mut events)?;

        for emitted in events.iter().filter(|e| args.offsets || e.event.is_onset()) {
            let output = EventOutput {
                event: &emitted.event,
                sample_rate,
            };
            println!("{}", formatter.format(&output));
            last_activity = Instant::now();
        }

        if last_activity.elapsed() >= Duration::from_secs(5) {
            log::info!(
                "No crossings in the last 5 s (threshold {})",
                detector.threshold_display(STREAM_ID)
            );
            last_activity = Instant::now();
        }
    }

    eprintln!("Audio stream closed");
    detector.stop_acquisition();
    Ok(())
}
