//! Error types for fetching, transforming and persisting tiles.

use contour::ContourError;
use thiserror::Error;
use tile_common::TileError;

/// Failure to obtain the raw bytes for one work item.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The source confirmed there is no data for this key.
    #[error("No data at {url}")]
    NotFound { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    /// Timeouts, refused or reset connections, truncated bodies.
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The request could not be built (bad URL, client misconfiguration).
    #[error("Invalid request for {url}: {message}")]
    Request { url: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Failure to turn a fetched raster into features.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Contour(#[from] ContourError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} exited with {status}: {stderr}")]
    Tool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Transform task aborted: {0}")]
    Join(String),
}

/// Why a work item ended in [`crate::Outcome::Failed`].
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

/// Fatal pipeline errors: preconditions, persistence and zero output.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Required tool '{0}' not found on PATH")]
    MissingDependency(String),

    #[error("No tiles were produced or already present")]
    NoOutput,

    #[error("Run was interrupted")]
    Interrupted,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Contour(#[from] ContourError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to create HTTP client: {0}")]
    HttpClient(String),

    #[error("Packager exited with {status}: {stderr}")]
    Packager { status: String, stderr: String },
}

pub type PipelineResult<T> = Result<T, PipelineError>;
