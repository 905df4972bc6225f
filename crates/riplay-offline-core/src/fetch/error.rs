use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network unreachable: {0}")]
    Unreachable(String),
}

impl FetchError {
    /// Map a non-2xx status to an error, used where only ok responses count
    pub fn from_status(url: &url::Url, status: u16) -> Self {
        FetchError::Status {
            url: url.to_string(),
            status,
        }
    }
}
