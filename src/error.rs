use thiserror::Error;

/// Upstream service a transport error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Telegram,
    Trmnl,
}

/// Errors raised while relaying a message to TRMNL.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("You don't have permission to use this bot")]
    Permission,

    #[error("{0}")]
    Validation(String),

    #[error("Can't find the file path from Telegram")]
    Resolution,

    /// Network failure or non-2xx response. `message` carries the upstream
    /// error detail when the service returned one.
    #[error("{message}")]
    Transport {
        service: Service,
        status: Option<u16>,
        message: String,
    },
}

impl RelayError {
    pub fn missing_photo() -> Self {
        Self::Validation("No photo found in the message".to_string())
    }

    pub fn request(service: Service, err: reqwest::Error) -> Self {
        Self::Transport {
            service,
            status: err.status().map(|s| s.as_u16()),
            // Strip the URL: for Telegram it contains the bot token.
            message: format!("{:#}", anyhow::Error::new(err.without_url())),
        }
    }

    pub fn upstream(service: Service, status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            service,
            status: Some(status),
            message: message.into(),
        }
    }

    /// Taxonomy name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::Permission => "permission",
            RelayError::Validation(_) => "validation",
            RelayError::Resolution => "resolution",
            RelayError::Transport { .. } => "transport",
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
