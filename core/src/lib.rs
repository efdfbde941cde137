pub mod cli;
pub mod config;
pub mod dataset;
pub mod llm;
pub mod sandbox;
pub mod table;
pub mod workflow;

// Re-export main types
pub use config::Config;
pub use dataset::DatasetRegistry;
pub use llm::{LlmError, LlmProvider, OpenAiProvider, ScriptedProvider};
pub use sandbox::{ChartOutcome, ExecutionOutcome, Sandbox, SandboxOptions};
pub use table::{Cell, DataFrame};
pub use workflow::{AnalysisWorkflow, Message, WorkflowResult, WorkflowStatus};
