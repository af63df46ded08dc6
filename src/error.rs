//! Error types for slackernetes.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid command pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// The Kubernetes API server answered with a non-success status.
    #[error("Cluster API error ({status}): {message}")]
    Gateway { status: u16, message: String },

    /// A user-supplied object name that cannot be used in an API path.
    #[error("Invalid object name: {0:?}")]
    InvalidName(String),

    #[error("Slack error: {0}")]
    Slack(String),
}

impl Error {
    pub fn gateway(status: u16, message: impl Into<String>) -> Self {
        Error::Gateway {
            status,
            message: message.into(),
        }
    }
}
