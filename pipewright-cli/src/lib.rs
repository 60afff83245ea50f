//! Library half of the `pipewright` binary: configuration file handling.

pub mod config;
