// Interview practice services: question generation and answer evaluation.
// All model calls go through llm_client. AI failures degrade to fallback content here.

pub mod fallback;
pub mod feedback;
pub mod handlers;
pub mod prompts;
pub mod questions;
