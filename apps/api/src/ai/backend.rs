use async_trait::async_trait;
use serde_json::Value;

use crate::ai::prompts::{build_user_prompt, role};
use crate::credits::AiOperation;
use crate::llm_client::prompts::{JSON_ONLY_INSTRUCTION, NO_FABRICATION_INSTRUCTION};
use crate::llm_client::{LlmClient, LlmError};

/// Produces the JSON result of one AI operation.
///
/// Carried in `AppState` as `Arc<dyn AiBackend>` so route tests can swap in a stub.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn generate(&self, operation: AiOperation, input: &Value) -> Result<Value, LlmError>;
}

pub fn system_prompt(operation: AiOperation) -> String {
    format!(
        "{} {} {}",
        role(operation),
        NO_FABRICATION_INSTRUCTION,
        JSON_ONLY_INSTRUCTION
    )
}

#[async_trait]
impl AiBackend for LlmClient {
    async fn generate(&self, operation: AiOperation, input: &Value) -> Result<Value, LlmError> {
        let prompt = build_user_prompt(operation, input);
        self.call_json(&prompt, &system_prompt(operation)).await
    }
}
