use thiserror::Error;

use jagged_core::{Error, NodeKey};

#[derive(Debug, Error)]
pub enum ExecError {
    /// A task failed while materializing one partition. Not retried.
    #[error("computing partition {partition} of `{key}` failed: {source}")]
    PartitionCompute {
        key: String,
        partition: usize,
        source: Error,
    },

    #[error("task graph has no task {0}")]
    MissingTask(NodeKey),

    #[error("invalid task graph: {0}")]
    Invalid(String),

    #[error("optimization failed: {0}")]
    Optimize(#[source] Error),

    #[error(transparent)]
    Core(#[from] Error),
}

impl ExecError {
    pub(crate) fn partition(key: &NodeKey, source: Error) -> Self {
        ExecError::PartitionCompute {
            key: key.name.clone(),
            partition: key.index,
            source,
        }
    }
}
