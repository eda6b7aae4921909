//! core/error.rs
//! Errors that stop processing of the current file (and the run).
//!
//! Missing tags and directory mismatches are NOT errors; they are values
//! (`Defect`, `DirMatch::Mismatch`) that route a file to the staging area.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{action} {path:?}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading tag from {path:?}: {source}")]
    TagRead {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },

    #[error("writing tag to {path:?}: {source}")]
    TagWrite {
        path: PathBuf,
        #[source]
        source: id3::Error,
    },

    #[error("running decoder {program:?}: {source}")]
    Decoder {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for `map_err` on filesystem calls.
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Error::Io {
            action,
            path,
            source,
        }
    }
}
