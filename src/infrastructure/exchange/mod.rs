pub mod client;
pub mod frames;
pub mod manager;

pub use client::{FrameHandler, WsClient, WsConfig, WsError};
pub use manager::MarketDataManager;
