// Errors
// Failures that cross the engine boundary: file I/O and settings parsing.
// Layout and editing report misuse through `log` and never fail.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings in {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot serialize settings: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),
}

impl DocumentError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DocumentError::Io {
            path: path.into(),
            source,
        }
    }
}
