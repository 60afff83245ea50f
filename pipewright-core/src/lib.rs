//! Embeddable pipeline orchestrator for pipewright.
//!
//! Provides a clap-free entry point: build a [`Runtime`](settings::Runtime)
//! once at process start and drive a [`Pipeline`](pipeline::Pipeline)
//! through its lifecycle.
//!
//! # Port traits
//!
//! All I/O beyond the pipeline's own files is abstracted behind ports:
//! - [`Exec`](pipewright_package::Exec) runs package commands
//! - [`EngineProvider`](ports::EngineProvider) hands out container engines
//! - [`EnvironmentSource`](ports::EnvironmentSource) captures and stores named environments
//! - [`CurrentPipelineStore`](ports::CurrentPipelineStore) persists the current-pipeline pointer
//!
//! The [`adapters`] module provides process- and filesystem-backed
//! implementations plus recording fakes for tests.

pub mod adapters;
pub mod error;
pub mod persist;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use error::PipelineError;
pub use pipeline::{ConfigureOutcome, Pipeline};
pub use settings::Runtime;
