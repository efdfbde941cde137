//! Query answering workflow
//!
//! `AnalysisWorkflow` classifies a question, has the model write analysis or
//! chart code, verifies it, runs it in the sandbox and writes the answer.

pub mod engine;
pub mod nodes;
pub mod prompts;
pub mod state;
pub mod verdict;

#[cfg(test)]
mod tests;

pub use engine::AnalysisWorkflow;
pub use state::{Intent, Message, Role, Stage, WorkflowResult, WorkflowState, WorkflowStatus};
pub use verdict::VerdictPolicy;
