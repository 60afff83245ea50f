use crate::definition::DeployMode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `<image>.yaml`: package type to the deploy mode it was baked in with.
pub type ContainerManifestV1 = BTreeMap<String, DeployMode>;

/// `<image>.manifest`: what an image was last built from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotV1 {
    pub packages: Vec<String>,
    pub interceptors: Vec<String>,
    pub container_base: String,
}

impl SnapshotV1 {
    /// Build a snapshot; type lists are sorted so order of appearance does not matter.
    pub fn new(
        packages: impl IntoIterator<Item = String>,
        interceptors: impl IntoIterator<Item = String>,
        container_base: impl Into<String>,
    ) -> Self {
        let mut packages: Vec<String> = packages.into_iter().collect();
        let mut interceptors: Vec<String> = interceptors.into_iter().collect();
        packages.sort();
        interceptors.sort();
        Self {
            packages,
            interceptors,
            container_base: container_base.into(),
        }
    }
}
