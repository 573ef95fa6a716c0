pub mod classify;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod runner;
pub mod subsample;
pub mod translate;
pub mod visualize;

pub use error::{PipelineError, Result};
