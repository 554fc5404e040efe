use serde::Serialize;
use tokio::time::Duration;

use crate::cache::response_cache::CacheConfig;
use crate::credits::AiOperation;

/// Cache tuning class. Output that depends only on short, widely shared input
/// is kept longest; output tailored to one user's resume is kept briefly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Reusable,
    Standard,
    Personalized,
}

impl CacheTier {
    pub fn config(self) -> CacheConfig {
        match self {
            CacheTier::Reusable => CacheConfig {
                max_size: 500,
                ttl: Duration::from_secs(24 * 60 * 60),
                cost_per_request: 0.002,
            },
            CacheTier::Standard => CacheConfig {
                max_size: 200,
                ttl: Duration::from_secs(60 * 60),
                cost_per_request: 0.01,
            },
            CacheTier::Personalized => CacheConfig {
                max_size: 50,
                ttl: Duration::from_secs(10 * 60),
                cost_per_request: 0.03,
            },
        }
    }

    pub fn for_operation(operation: AiOperation) -> Self {
        match operation {
            AiOperation::EnhanceBullet | AiOperation::SuggestSkills => CacheTier::Reusable,
            AiOperation::GenerateSummary
            | AiOperation::AtsAnalysis
            | AiOperation::LinkedinOptimize => CacheTier::Standard,
            AiOperation::TailorResume | AiOperation::CoverLetter | AiOperation::InterviewPrep => {
                CacheTier::Personalized
            }
        }
    }
}
