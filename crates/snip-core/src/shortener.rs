use crate::repository::UrlMapping;
use crate::shortcode::ShortCode;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

type Result<T> = std::result::Result<T, crate::error::ShortenerError>;

/// One entry of a batch shorten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShortenRequest {
    pub long_url: String,
    #[serde(default)]
    pub owner: Option<String>,
}

impl ShortenRequest {
    pub fn new(long_url: impl Into<String>, owner: Option<&str>) -> Self {
        Self {
            long_url: long_url.into(),
            owner: owner.map(str::to_owned),
        }
    }
}

#[async_trait]
pub trait Shortener: Send + Sync + 'static {
    /// Returns the short code for `long_url`, creating the mapping on first use.
    ///
    /// Calling this again with the same long URL and owner returns the same
    /// code without writing anything.
    async fn shorten(&self, long_url: &str, owner: Option<&str>) -> Result<ShortCode>;

    /// Shortens every request in order under one deadline.
    ///
    /// Codes are returned in request order. The first failure aborts the
    /// batch; mappings created before it stay stored.
    async fn shorten_batch(&self, requests: &[ShortenRequest]) -> Result<Vec<ShortCode>>;

    /// Resolves a short code to the long URL it was issued for.
    async fn resolve(&self, code: &str) -> Result<String>;

    /// Every mapping `owner` has created, oldest first.
    async fn list_by_owner(&self, owner: &str) -> Result<Vec<UrlMapping>>;

    /// Checks that the storage backend is reachable.
    async fn ping(&self) -> Result<()>;
}
