use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Every AI feature that consumes credits.
///
/// The set is closed: an operation name that does not parse into this enum is
/// rejected at the boundary, before any usage is read or written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiOperation {
    EnhanceBullet,
    SuggestSkills,
    GenerateSummary,
    AtsAnalysis,
    TailorResume,
    CoverLetter,
    LinkedinOptimize,
    InterviewPrep,
}

impl AiOperation {
    pub const ALL: [AiOperation; 8] = [
        AiOperation::EnhanceBullet,
        AiOperation::SuggestSkills,
        AiOperation::GenerateSummary,
        AiOperation::AtsAnalysis,
        AiOperation::TailorResume,
        AiOperation::CoverLetter,
        AiOperation::LinkedinOptimize,
        AiOperation::InterviewPrep,
    ];

    /// Credits charged per call.
    pub fn cost(self) -> u32 {
        match self {
            AiOperation::EnhanceBullet | AiOperation::SuggestSkills => 1,
            AiOperation::GenerateSummary => 2,
            AiOperation::AtsAnalysis | AiOperation::TailorResume => 3,
            AiOperation::LinkedinOptimize => 4,
            AiOperation::CoverLetter | AiOperation::InterviewPrep => 5,
        }
    }

    /// Operations gated to the premium plan regardless of credit balance.
    pub fn premium_only(self) -> bool {
        matches!(
            self,
            AiOperation::LinkedinOptimize | AiOperation::InterviewPrep
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AiOperation::EnhanceBullet => "enhance_bullet",
            AiOperation::SuggestSkills => "suggest_skills",
            AiOperation::GenerateSummary => "generate_summary",
            AiOperation::AtsAnalysis => "ats_analysis",
            AiOperation::TailorResume => "tailor_resume",
            AiOperation::CoverLetter => "cover_letter",
            AiOperation::LinkedinOptimize => "linkedin_optimize",
            AiOperation::InterviewPrep => "interview_prep",
        }
    }
}

impl fmt::Display for AiOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown AI operation '{0}'")]
pub struct UnknownOperation(pub String);

impl FromStr for AiOperation {
    type Err = UnknownOperation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AiOperation::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| UnknownOperation(s.to_string()))
    }
}
