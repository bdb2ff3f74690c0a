pub mod redis_adapter;
pub mod store;

pub use redis_adapter::{RedisLeaseStore, RedisQueue};
pub use store::PgStore;
