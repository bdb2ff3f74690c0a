pub mod barrier;
pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod outbox;
pub mod ports;
pub mod registry;
pub mod signature;
pub mod sweeper;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result};
pub use registry::JobContextRegistry;
