use thiserror::Error;

/// Errors raised while harvesting places and reviews.
///
/// Everything except [`HarvestError::Configuration`] is recoverable at the
/// pipeline level: the failing query or place is logged and skipped.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Network failure or non-2xx HTTP status.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        status: Option<u16>,
    },

    /// The response parsed but lacked the fields we rely on.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The browser never reached an expected page state.
    #[error("navigation timed out after {waited_secs}s waiting for {waiting_for}")]
    NavigationTimeout {
        waiting_for: String,
        waited_secs: u64,
    },

    /// None of the fallback locators matched.
    #[error("element not found: {what} (tried: {})", .tried.join(", "))]
    ElementNotFound { what: String, tried: Vec<String> },

    /// Missing credential or unusable settings. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl HarvestError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Browser-layer failures come back from `headless_chrome` as `anyhow` errors.
    pub fn browser(err: anyhow::Error) -> Self {
        Self::transport(format!("browser: {err:#}"))
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::MalformedResponse(err.to_string());
        }
        Self::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = HarvestError> = std::result::Result<T, E>;
