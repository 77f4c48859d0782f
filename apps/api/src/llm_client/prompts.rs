// Shared prompt fragments.
// Each service that needs model calls defines its own prompts.rs alongside it.
// This file contains cross-cutting instructions about output shape.

/// Appended to prompts that expect a JSON array back.
pub const JSON_ARRAY_ONLY: &str = "Return ONLY a valid JSON array. \
    No markdown, no code fences, no explanations.";

/// Appended to prompts that expect a single JSON object back.
pub const JSON_OBJECT_ONLY: &str = "Return ONLY a valid JSON object. \
    Do not include any markdown formatting or text outside the JSON object.";
