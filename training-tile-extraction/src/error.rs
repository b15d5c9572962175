use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for scene extraction.
///
/// Anything here aborts the current scene (or the current write); tiles
/// skipped for normal edge-of-raster reasons are reported through
/// [`crate::extract::SkipReason`] instead and never surface as errors.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// A label source or auxiliary raster could not be read. The caller
    /// should treat this as "redownload and retry"; the core never
    /// retries on its own.
    #[error("failed to read source raster {path:?}: {source}")]
    SourceRead {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A raster did not land on the expected scene grid.
    #[error("raster {path:?} has grid {actual:?}, expected {expected:?}")]
    GridMismatch {
        path: PathBuf,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    /// Stacking the scene's band files failed. Fatal to the whole
    /// path/row/year extraction; the scene needs redownloading.
    #[error("failed to stack scene {scene}: {source}")]
    SceneStack {
        scene: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The scene directory does not exist and no fetcher produced it.
    #[error("scene directory {dir:?} is missing")]
    SceneMissing { dir: PathBuf },

    /// A generated artifact name already exists on disk. Never
    /// overwritten; the write fails instead.
    #[error("tile artifact {path:?} already exists, refusing to overwrite")]
    NameCollision { path: PathBuf },

    /// Writing a tile artifact failed for an ordinary I/O reason.
    #[error("failed to persist tile to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ExtractError {
    pub fn source_read(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ExtractError::SourceRead {
            path: path.into(),
            source: Box::new(source),
        }
    }

    pub fn persist(
        path: impl Into<PathBuf>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ExtractError::Persist {
            path: path.into(),
            source: Box::new(source),
        }
    }
}
