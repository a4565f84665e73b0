pub mod position;
pub mod signal;

pub use position::PositionSummary;
pub use signal::{Signal, SignalAction};
