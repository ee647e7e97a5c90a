pub mod http_pool;
pub mod tempfiles;

pub use http_pool::{HttpPool, PoolMetrics};
