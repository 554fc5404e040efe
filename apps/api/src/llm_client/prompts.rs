// Prompt fragments shared by every AI operation.
// Operation-specific prompts live in ai/prompts.rs.

/// Appended to every system prompt: the response is parsed as JSON and cached.
pub const JSON_ONLY_INSTRUCTION: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON value. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Keeps generated resume content truthful to what the user supplied.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
    Never invent employers, titles, dates, degrees, certifications or metrics. \
    If the input lacks a number, you may suggest where one belongs using a \
    placeholder such as [X%], but never make one up.";
