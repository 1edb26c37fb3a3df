//! The data pipeline of the car classifier.

mod common;
pub mod checkpoint;
pub mod dataset;
pub mod error;
pub mod generator;
pub mod label;
pub mod model;
pub mod orchestrator;
pub mod processor;
pub mod utils;

pub use error::PipelineError;
