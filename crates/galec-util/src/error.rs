//! Infrastructure error types.
//!
//! Analysis failures are diagnostics, not `Err` values; these types cover
//! the infrastructure failures (file I/O, lookups into the source map) that
//! callers handle with `?`.

use std::path::PathBuf;

use thiserror::Error;

/// Error type for source map operations.
#[derive(Debug, Error)]
pub enum SourceMapError {
    /// File could not be read from disk.
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File id does not refer to a registered file.
    #[error("unknown file id {0}")]
    UnknownFile(u32),
}

/// Result type alias for source map operations.
pub type SourceMapResult<T> = std::result::Result<T, SourceMapError>;
