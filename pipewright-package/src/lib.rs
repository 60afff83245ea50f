//! The package contract.
//!
//! Every service, application and interceptor implements [`Package`]. Plugins
//! are stateless strategy objects: the per-instance data (config, environment
//! views, directories) lives in a [`PackageState`] that the loader owns and
//! passes into every hook, so a deploy-mode delegate can be swapped in while
//! sharing the same state.
//!
//! # Port traits
//!
//! - [`Exec`](exec::Exec) runs commands locally, over SSH, or under MPI.

pub mod context;
pub mod contract;
pub mod exec;
pub mod schema;
pub mod state;

pub use context::PipelineContext;
pub use contract::{Package, PackageKind};
pub use exec::{Exec, ExecOptions, ExecOutput, HostOutput, Launcher};
pub use schema::{ConfigOption, ConfigSchema, OptionType, SchemaError, common_options};
pub use state::{PackageState, SharedEnv, render_template};
