use thiserror::Error;

/// Faults at the REST boundary. Every variant maps to a distinct user-facing
/// branch: callers must not collapse `Conflict` or `Rejected` into `Network`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication failed")]
    Unauthorized,

    #[error("order already taken by another rider")]
    Conflict,

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("account is {0}")]
    AccountDisabled(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("internal error: {0}")]
    Internal(String),
}
