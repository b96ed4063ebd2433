pub mod agents;
pub mod audit;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod llm;
pub mod models;
pub mod persistence;
pub mod routing;
pub mod utils;
pub mod workflow;

#[cfg(feature = "cli")]
pub mod cli;

pub use dispatch::{DispatchOutcome, Dispatcher};
pub use errors::ConductorError;
