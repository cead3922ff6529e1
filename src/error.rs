use std::path::PathBuf;
use thiserror::Error;

/// Main error type for cronscan
#[derive(Error, Debug)]
pub enum CronscanError {
    /// Database-related errors (store rejections, migrations, queries)
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// File system I/O errors not tied to a crontab
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Local host identity could not be determined
    #[error("Host resolution error: {0}")]
    HostResolution(String),

    /// A crontab could not be opened or read
    #[error("Cannot access crontab {}: {source}", .path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A crontab line did not tokenize into a usable entry
    #[error("Malformed entry {fields:?}: {reason}")]
    MalformedEntry { fields: Vec<String>, reason: String },

    /// Record submitted after the store was shut down
    #[error("Record store is closed")]
    StoreClosed,

    /// Blocking task failed to complete
    #[error("Task join error: {0}")]
    Join(String),
}

impl CronscanError {
    /// Errors that end the whole run rather than a single user or record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::HostResolution(_))
    }
}

/// Convenient Result type using CronscanError
pub type Result<T> = std::result::Result<T, CronscanError>;
