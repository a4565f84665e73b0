pub mod engine;
pub mod loader;
pub mod metrics;
pub mod report;
pub mod simulator;
pub mod tracker;

pub use engine::{BacktestConfig, BacktestEngine};
pub use metrics::{BacktestReport, MetricsCalculator, ReplayTotals};
pub use simulator::OrderSimulator;
pub use tracker::PositionTracker;
