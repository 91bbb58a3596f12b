pub mod engine;
pub mod history;
pub mod refractory;
pub mod threshold;
pub mod voting;

pub use engine::{BufferInput, CrossingEngine, EventTarget};
pub use history::HistoryBuffer;
pub use refractory::{JumpLimit, RefractoryController};
pub use threshold::{ThresholdProvider, ThresholdSource};
pub use voting::VotingWindow;
