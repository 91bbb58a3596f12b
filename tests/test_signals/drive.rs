use crossing_detector::{
    CrossingDetector, DetectorConfig, EmittedEvent, StreamBuffer, StreamId, StreamInfo,
};

/// Detector with one registered stream of `channels` channels, already acquiring
#[allow(dead_code)]
pub fn started_detector(
    config: DetectorConfig,
    stream: StreamId,
    sample_rate: f32,
    channels: usize,
) -> CrossingDetector {
    let mut detector = CrossingDetector::new(config).expect("valid config");
    detector
        .update_streams(&[StreamInfo::new(stream, sample_rate, channels)])
        .expect("valid stream");
    detector.start_acquisition().expect("acquisition starts");
    detector
}

/// Feed `channels` to `stream`, cutting the signal at each of `splits`
#[allow(dead_code)]
pub fn run_split(
    detector: &mut CrossingDetector,
    stream: StreamId,
    channels: &[Vec<f32>],
    splits: &[usize],
) -> Vec<EmittedEvent> {
    let len = channels.first().map_or(0, Vec::len);
    let mut bounds: Vec<usize> = splits.iter().copied().filter(|&s| s < len).collect();
    bounds.push(len);

    let mut events = Vec::new();
    let mut start = 0;
    for end in bounds {
        let slices: Vec<&[f32]> = channels.iter().map(|c| &c[start..end]).collect();
        let buffer = StreamBuffer::new(start as i64, &slices).expect("equal channel lengths");
        detector
            .process(stream, &buffer, &mut events)
            .expect("buffer processes");
        start = end;
    }
    events
}

#[allow(dead_code)]
pub fn onset_points(events: &[EmittedEvent]) -> Vec<i64> {
    events
        .iter()
        .filter(|e| e.event.is_onset())
        .map(|e| e.event.crossing_point)
        .collect()
}

/// Offset crossing points, identifying which onset each offset closes
#[allow(dead_code)]
pub fn offset_points(events: &[EmittedEvent]) -> Vec<i64> {
    events
        .iter()
        .filter(|e| !e.event.is_onset())
        .map(|e| e.event.crossing_point)
        .collect()
}
