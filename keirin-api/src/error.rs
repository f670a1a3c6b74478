use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("retries exhausted for {url}")]
    RetriesExhausted { url: String },

    #[error("invalid response body from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("response shape check failed for {url}: {message}")]
    Shape { url: String, message: String },

    #[error("could not decode response body with any known charset: {url}")]
    Charset { url: String },

    #[error("invalid date argument: {0}")]
    InvalidDate(String),
}

pub type ApiResult<T> = Result<T, ApiError>;
