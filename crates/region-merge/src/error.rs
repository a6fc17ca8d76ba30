use region_merge_lib::MergeError;
use std::path::PathBuf;

/// Errors that end a CLI run
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid GeoJSON: {0}")]
    GeoJson(String),
}

pub type Result<T> = std::result::Result<T, CliError>;
