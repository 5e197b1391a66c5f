mod memory;
#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
mod redis_list;

pub use memory::InMemoryQueue;
#[cfg(feature = "database")]
pub use redis_list::RedisQueue;
