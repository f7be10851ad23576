use thiserror::Error;

#[derive(Debug, Error)]
pub enum PopError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path '{0}'")]
    InvalidPath(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("'{0}' is a directory")]
    NotAFile(String),

    /// Every candidate in the directory was a directory, a dotfile, or lost
    /// the rename race.
    #[error("No entry available in '{0}'")]
    PoolExhausted(String),

    #[error("Cannot list '{path}': {source}")]
    Lookup {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot stash '{path}': {source}")]
    Stash {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, PopError>;
