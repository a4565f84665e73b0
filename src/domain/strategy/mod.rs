pub mod advisor;
pub mod trend;

pub use advisor::{AdvisorConfig, GridAdvisor, OpenAdvice, OpenAdviceStrategy};
pub use trend::{TrendAnalyzer, TrendConfig, TrendInfo, TrendState};
