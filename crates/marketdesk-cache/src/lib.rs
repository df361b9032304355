pub mod error;
pub mod key;
pub mod query;

pub use error::CacheError;
pub use key::{CacheKey, Collection};
pub use query::QueryCache;
