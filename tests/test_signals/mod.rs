pub mod drive;
pub mod generate;

#[allow(unused_imports)]
pub use drive::{offset_points, onset_points, run_split, started_detector};
#[allow(unused_imports)]
pub use generate::{pulses, step_at};
