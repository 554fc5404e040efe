// AI routes: abuse guard → credit ledger → cached LLM call.
// All provider traffic goes through `AiBackend`.

pub mod backend;
pub mod handlers;
pub mod prompts;

pub use backend::AiBackend;
