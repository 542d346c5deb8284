//! Client error types.

/// Errors that can occur when using the storefront client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The wallet cannot cover the request.
    #[error("insufficient wallet balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance in cents.
        balance: i64,
        /// Required amount in cents.
        required: i64,
    },

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The call needs a signed-in user but the client has no token.
    #[error("this call requires a bearer token")]
    MissingToken,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
