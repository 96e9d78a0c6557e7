pub mod config;
pub mod memory;
pub mod redis;
pub mod store;
pub mod types;

pub use config::Config;
pub use memory::MemoryStore;
pub use store::{ResultStore, StoreError, StoreResult};
