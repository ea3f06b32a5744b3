use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the FTDC codec.
///
/// Every fallible operation in the library (everything outside `main.rs`)
/// returns `Result<T, FtdcError>`. The one case that is never surfaced as an
/// error is the metrics-count soft mismatch (§4.D.6 / schema tolerance) — that
/// path always logs a warning and keeps going instead.
#[derive(Debug, Error)]
pub enum FtdcError {
    #[error("FTDC file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("truncated while reading {context}")]
    Truncated { context: &'static str },

    #[error("corrupt FTDC data ({context})")]
    Corrupt {
        context: &'static str,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("unsupported BSON type 0x{type_byte:02x} for field '{field}'")]
    UnsupportedType { type_byte: u8, field: String },

    #[error(
        "metrics count mismatch exceeds tolerance: header says {header_count}, \
         scanner walk found {actual_count}"
    )]
    Schema {
        header_count: u32,
        actual_count: usize,
    },

    #[error("sample index {index} out of range (chunk has {npoints} points)")]
    RangeError { index: usize, npoints: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FtdcError {
    pub(crate) fn corrupt(context: &'static str) -> Self {
        FtdcError::Corrupt {
            context,
            source: None,
        }
    }

    pub(crate) fn corrupt_with(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FtdcError::Corrupt {
            context,
            source: Some(Box::new(source)),
        }
    }
}

pub type Result<T> = std::result::Result<T, FtdcError>;
