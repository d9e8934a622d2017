use thiserror::Error;

/// Failure taxonomy for a single compression attempt.
///
/// The lifecycle and asset layers let these propagate to their direct caller;
/// the orchestrator is the single containment boundary and folds them into a
/// non-throwing [`crate::compress::CompressionResult`].
#[derive(Debug, Error)]
pub enum CompressError {
    /// Network or cache failure while fetching an engine binary asset.
    #[error("failed to resolve engine asset {url}: {source}")]
    AssetResolution { url: String, source: anyhow::Error },

    /// The engine rejected its own bootstrap.
    #[error("failed to initialize compression engine: {0}")]
    EngineLoad(#[source] anyhow::Error),

    /// The engine ran but produced nothing usable.
    #[error("compression produced empty output")]
    EmptyOutput,

    /// The engine produced output that is not an MP4 container.
    #[error("unsupported output returned from compression")]
    UnsupportedOutput,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
