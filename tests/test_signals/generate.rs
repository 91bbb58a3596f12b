/// `low` until `at`, `high` from `at` on
#[allow(dead_code)]
pub fn step_at(len: usize, at: usize, low: f32, high: f32) -> Vec<f32> {
    (0..len).map(|i| if i < at { low } else { high }).collect()
}

/// `low` with `width`-sample excursions to `high` starting at each of `starts`
#[allow(dead_code)]
pub fn pulses(len: usize, starts: &[usize], width: usize, low: f32, high: f32) -> Vec<f32> {
    let mut samples = vec![low; len];
    for &start in starts {
        for sample in samples.iter_mut().skip(start).take(width) {
            *sample = high;
        }
    }
    samples
}
