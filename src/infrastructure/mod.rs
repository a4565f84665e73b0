pub mod bus;
pub mod exchange;
pub mod store;

pub use bus::MessageBus;
pub use store::KvStore;
