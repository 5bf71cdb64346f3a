pub mod cache;
pub mod cli;
pub mod config;
pub mod generator;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use generator::state::PipelineState;
pub use generator::workflow::{ResearchPipeline, launch};
