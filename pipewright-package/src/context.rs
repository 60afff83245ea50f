use crate::exec::Exec;
use pipewright_types::{Hostfile, Layout};
use std::fmt;
use std::sync::Arc;

/// What a package instance knows about the pipeline it belongs to.
#[derive(Clone)]
pub struct PipelineContext {
    pub pipeline: String,
    pub layout: Layout,
    /// The pipeline's hostfile, or the global one when the pipeline has none.
    pub hostfile: Hostfile,
    pub exec: Arc<dyn Exec>,
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("pipeline", &self.pipeline)
            .field("layout", &self.layout)
            .field("hostfile", &self.hostfile)
            .finish_non_exhaustive()
    }
}
