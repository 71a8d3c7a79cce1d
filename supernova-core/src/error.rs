use thiserror::Error;

/// Errors produced by the forecast and chat clients.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Caller-supplied parameters violate preconditions.
    #[error("{0}")]
    InvalidQuery(String),

    /// The provider has no location matching the city.
    #[error("no locations found for '{0}'")]
    NotFound(String),

    /// Network failure, timeout or non-success HTTP status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a body that does not match its contract.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller tore the request down before it completed.
    #[error("request cancelled")]
    Cancelled,
}

impl FetchError {
    /// Message suitable for sending back to a chat user.
    ///
    /// Query and lookup problems are surfaced verbatim, provider failures get a
    /// generic text.
    pub fn user_message(&self) -> String {
        match self {
            FetchError::InvalidQuery(msg) => msg.clone(),
            FetchError::NotFound(city) => format!("City '{city}' was not found"),
            FetchError::Transport(_) => {
                "The provider could not be reached. Please try again later".to_string()
            }
            FetchError::Decode(_) => {
                "The provider returned an unexpected response. Please try again later"
                    .to_string()
            }
            FetchError::Cancelled => "Request was cancelled".to_string(),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            FetchError::Decode(err.to_string())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}
