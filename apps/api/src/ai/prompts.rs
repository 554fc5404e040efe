use crate::credits::AiOperation;

/// Role description for each operation's system prompt.
pub fn role(operation: AiOperation) -> &'static str {
    match operation {
        AiOperation::EnhanceBullet => {
            "You are a resume editor who rewrites single experience bullets to be \
             concise, action-led and outcome-focused."
        }
        AiOperation::SuggestSkills => {
            "You are a career coach who suggests relevant hard and soft skills for a \
             job title and experience summary."
        }
        AiOperation::GenerateSummary => {
            "You are a resume writer who drafts three-sentence professional summaries."
        }
        AiOperation::AtsAnalysis => {
            "You are an applicant-tracking-system analyst who scores a resume against a \
             job description and lists missing keywords."
        }
        AiOperation::TailorResume => {
            "You are a resume strategist who reorders and rephrases existing resume \
             content to match a target job description."
        }
        AiOperation::CoverLetter => {
            "You are a cover letter writer who drafts a one-page letter from a resume \
             and a job description."
        }
        AiOperation::LinkedinOptimize => {
            "You are a LinkedIn profile consultant who rewrites headline and About \
             sections from resume content."
        }
        AiOperation::InterviewPrep => {
            "You are an interview coach who prepares likely questions and answer \
             outlines grounded in the candidate's resume."
        }
    }
}

/// Expected JSON shape of the model's answer.
pub fn output_schema(operation: AiOperation) -> &'static str {
    match operation {
        AiOperation::EnhanceBullet => r#"{"bullet": "...", "alternatives": ["...", "..."]}"#,
        AiOperation::SuggestSkills => r#"{"hard_skills": ["..."], "soft_skills": ["..."]}"#,
        AiOperation::GenerateSummary => r#"{"summary": "..."}"#,
        AiOperation::AtsAnalysis => {
            r#"{"score": 0, "matched_keywords": ["..."], "missing_keywords": ["..."], "suggestions": ["..."]}"#
        }
        AiOperation::TailorResume => {
            r#"{"summary": "...", "sections": [{"title": "...", "bullets": ["..."]}]}"#
        }
        AiOperation::CoverLetter => r#"{"greeting": "...", "paragraphs": ["..."], "closing": "..."}"#,
        AiOperation::LinkedinOptimize => r#"{"headline": "...", "about": "..."}"#,
        AiOperation::InterviewPrep => {
            r#"{"questions": [{"question": "...", "answer_outline": ["..."]}]}"#
        }
    }
}

pub const USER_PROMPT_TEMPLATE: &str = r#"Task input (JSON):
{input}

Return a JSON value with EXACTLY this shape:
{schema}"#;

pub fn build_user_prompt(operation: AiOperation, input: &serde_json::Value) -> String {
    USER_PROMPT_TEMPLATE
        .replace("{schema}", output_schema(operation))
        .replace("{input}", &input.to_string())
}
