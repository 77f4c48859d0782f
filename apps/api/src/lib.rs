//! MockPrep API: resilient text generation for interview practice.
//!
//! `llm_client` owns every model call (rate limiting, model fallback, response repair).
//! `interview` builds on it and degrades to deterministic content when the AI path fails.

pub mod config;
pub mod errors;
pub mod interview;
pub mod llm_client;
pub mod models;
pub mod routes;
pub mod state;
