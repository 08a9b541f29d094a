use thiserror::Error;

/// Failure taxonomy shared by every stage of a crawl.
///
/// `DataSame` is not a failure: the cache returns it when an observation
/// matches the last stored one, and the crawl treats it as a no-op.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CrawlError {
    #[error("fetch {url} failed: {reason}")]
    Fetch { url: String, reason: String },

    #[error("malformed GBK byte sequence in {0}")]
    Encoding(String),

    #[error("marker not found: {0}")]
    Extraction(String),

    #[error("malformed payload: {0}")]
    Decode(String),

    #[error("data same")]
    DataSame,

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("delivery: {0}")]
    Delivery(String),
}

impl CrawlError {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        CrawlError::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_data_same(&self) -> bool {
        matches!(self, CrawlError::DataSame)
    }
}
