use std::sync::Arc;

use crate::abuse::AbuseGuard;
use crate::ai::AiBackend;
use crate::cache::CacheRegistry;
use crate::credits::CreditLedger;

/// Shared application state injected into all route handlers via Axum extractors.
/// Everything stateful is constructed in `main` and passed in; nothing is global.
#[derive(Clone)]
pub struct AppState {
    pub ledger: CreditLedger,
    pub guard: AbuseGuard,
    /// Process-local AI response caches, one per operation.
    pub caches: Arc<CacheRegistry>,
    /// The LLM provider behind every AI route. Default: `LlmClient`.
    pub ai: Arc<dyn AiBackend>,
}
