use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::cache::response_cache::{CacheStats, ResponseCache};
use crate::cache::tiers::CacheTier;
use crate::credits::AiOperation;

#[derive(Debug, Clone, Serialize)]
pub struct NamedCacheStats {
    pub tier: CacheTier,
    #[serde(flatten)]
    pub stats: CacheStats,
}

/// One response cache per AI operation, tuned by the operation's tier.
/// Built once at startup and shared through `AppState`.
pub struct CacheRegistry {
    caches: HashMap<AiOperation, ResponseCache<Value>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        let caches = AiOperation::ALL
            .into_iter()
            .map(|op| {
                let tier = CacheTier::for_operation(op);
                (op, ResponseCache::new(op.as_str(), tier.config()))
            })
            .collect();
        info!("AI response caches initialized for {} operations", AiOperation::ALL.len());
        Self { caches }
    }

    pub fn for_operation(&self, operation: AiOperation) -> Option<&ResponseCache<Value>> {
        self.caches.get(&operation)
    }

    pub fn stats(&self) -> Vec<NamedCacheStats> {
        let mut stats: Vec<_> = self
            .caches
            .iter()
            .map(|(op, cache)| NamedCacheStats {
                tier: CacheTier::for_operation(*op),
                stats: cache.stats(),
            })
            .collect();
        stats.sort_by(|a, b| a.stats.name.cmp(&b.stats.name));
        stats
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}
