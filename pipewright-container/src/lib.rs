//! Container image bookkeeping.
//!
//! Every image has three files in the containers directory: a manifest of
//! which package types it contains (and in which deploy mode), the
//! Dockerfile assembled from the packages' fragments, and a snapshot of the
//! member list it was last built from.
//!
//! # Port traits
//!
//! - [`ContainerEngine`](engine::ContainerEngine) builds images and drives compose.

pub mod compose;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod store;

pub use compose::{ComposeInput, compose_document, merge_overlay, run_args, write_compose};
pub use coordinator::{BatchOutcome, ContainerBuildCoordinator, ContainerMember};
pub use engine::{ComposeAction, ContainerEngine};
pub use error::ContainerError;
pub use store::ContainerStore;
