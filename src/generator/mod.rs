pub mod context;
pub mod executor;
pub mod outlet;
pub mod planner;
pub mod prompts;
pub mod researcher;
pub mod state;
pub mod types;
pub mod workflow;
