mod memory;
#[cfg(feature = "database")]
#[cfg_attr(docsrs, doc(cfg(feature = "database")))]
mod postgres;

pub use memory::InMemoryTaskStore;
#[cfg(feature = "database")]
pub use postgres::PostgresTaskStore;
