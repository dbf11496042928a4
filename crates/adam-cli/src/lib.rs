//! Library side of the `adam` command: configuration, logging, and stage
//! orchestration.

pub mod config;
pub mod logging;
pub mod pipeline;
pub mod types;
