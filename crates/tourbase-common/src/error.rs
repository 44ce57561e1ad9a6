//! Error types for Tourbase

use thiserror::Error;

/// Tourbase-specific error types
#[derive(Error, Debug)]
pub enum Error {
    // Realtime Errors
    #[error("Failed to open channel for table {table}: {reason}")]
    ChannelOpen { table: String, reason: String },

    #[error("Channel closed for table: {0}")]
    ChannelClosed(String),

    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    // General Errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for Tourbase operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Stable error code for logs and API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ChannelOpen { .. } => "channel_open_failed",
            Self::ChannelClosed(_) => "channel_closed",
            Self::SubscriptionError(_) => "subscription_error",
            Self::ConfigError(_) => "config_error",
            Self::InternalError(_) => "internal_error",
            Self::IoError(_) => "io_error",
            Self::JsonError(_) => "json_error",
        }
    }
}
