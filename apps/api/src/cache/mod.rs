// AI Response Cache: tiered in-process TTL caches in front of the LLM provider.
// Not shared between instances; each process warms its own entries.

pub mod handlers;
pub mod key;
pub mod registry;
pub mod response_cache;
pub mod tiers;

pub use registry::CacheRegistry;
pub use response_cache::{with_cache, Cached};
