pub mod store;

pub use store::{AudioStore, CacheError, StoreMetrics};
