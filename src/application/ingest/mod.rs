pub mod handlers;
pub mod service;

pub use handlers::{CandlePersistHandler, TickerPersistHandler};
pub use service::{IngestService, cleanup_ingress_keys};
