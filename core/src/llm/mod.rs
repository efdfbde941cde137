//! Language-model access
//!
//! Workflow stages talk to models only through `LlmProvider`. `OpenAiProvider`
//! speaks the OpenAI-compatible chat completions protocol; `ScriptedProvider`
//! replays canned replies for tests and offline runs.

pub mod error;
pub mod openai;
pub mod provider;
pub mod scripted;

pub use error::{parse_http_error, LlmError, LlmResult};
pub use openai::OpenAiProvider;
pub use provider::{complete_within, LlmProvider};
pub use scripted::{Reply, ScriptedProvider};
