// Resume Scoring Engine
// Covers truncation, prompt building, remote evaluation, reply interpretation,
// deterministic fallback scoring and batch coordination.
// All model calls go through llm_client; no direct HTTP calls here.

pub mod batch;
pub mod engine;
pub mod fallback;
pub mod handlers;
pub mod interpreter;
pub mod models;
pub mod prompts;
pub mod truncate;
