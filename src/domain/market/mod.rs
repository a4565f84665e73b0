pub mod bar;
pub mod candle;
pub mod keys;
pub mod price;
pub mod retention;
pub mod ticker;

pub use bar::Bar;
pub use candle::{Candle, CandleEvent};
pub use price::Price;
pub use retention::RetentionPolicy;
pub use ticker::Ticker;
