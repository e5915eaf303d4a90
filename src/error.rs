// Code Manager Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodeManagerError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema setup failed: {0}")]
    Schema(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Record not found: {0}")]
    NotFound(i64),

    #[error("Invalid content: {0}")]
    InvalidContent(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} failed (exit code {code:?}): {stderr}")]
    Subprocess {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Printing is not supported on {0}")]
    UnsupportedPlatform(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Confirmation rejected: expected the database name '{0}'")]
    ConfirmationRejected(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for CodeManagerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, _)
                if matches!(
                    e.code,
                    rusqlite::ErrorCode::CannotOpen
                        | rusqlite::ErrorCode::NotADatabase
                        | rusqlite::ErrorCode::PermissionDenied
                ) =>
            {
                CodeManagerError::Connection(err.to_string())
            }
            _ => CodeManagerError::Database(err.to_string()),
        }
    }
}

impl From<mysql::Error> for CodeManagerError {
    fn from(err: mysql::Error) -> Self {
        match err {
            mysql::Error::IoError(_) | mysql::Error::UrlError(_) | mysql::Error::DriverError(_) => {
                CodeManagerError::Connection(err.to_string())
            }
            // Access denied / unknown database: the server is reachable but the login is not usable
            mysql::Error::MySqlError(ref e) if matches!(e.code, 1044 | 1045 | 1049) => {
                CodeManagerError::Connection(err.to_string())
            }
            _ => CodeManagerError::Database(err.to_string()),
        }
    }
}

impl From<toml::de::Error> for CodeManagerError {
    fn from(err: toml::de::Error) -> Self {
        CodeManagerError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for CodeManagerError {
    fn from(err: toml::ser::Error) -> Self {
        CodeManagerError::Config(err.to_string())
    }
}

impl From<image::ImageError> for CodeManagerError {
    fn from(err: image::ImageError) -> Self {
        CodeManagerError::Generation(err.to_string())
    }
}

impl CodeManagerError {
    /// Build a subprocess error from a finished command's output.
    pub fn subprocess(tool: &str, output: &std::process::Output) -> Self {
        CodeManagerError::Subprocess {
            tool: tool.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CodeManagerError>;
