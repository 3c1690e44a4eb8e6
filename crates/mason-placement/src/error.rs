use thiserror::Error;

/// Failures raised while resolving cluster topology through a device source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("cluster has no nodes")]
    EmptyCluster,

    #[error("cluster has nodes but no usable devices")]
    NoStorage,

    #[error("entry not found: {0}")]
    NotFound(String),

    #[error("backing store error: {0}")]
    Backend(String),
}

/// Failures raised by the brick placers and the size back-off driver.
#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("no space available for brick placement")]
    NoSpace,

    #[error("brick size would fall below the minimum; no space")]
    MinimumBrickSize,

    #[error("index {index} out of bounds for brick set of size {set_size}")]
    OutOfBounds { index: usize, set_size: usize },

    #[error(
        "average file size ({average_file_size} KiB) is no smaller than the \
         brick size ({brick_size} KiB); cannot size an arbiter brick"
    )]
    ArbiterDiscount {
        brick_size: u64,
        average_file_size: u64,
    },

    #[error(transparent)]
    Source(#[from] SourceError),
}
