use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::app::error::FetchError;
use crate::app::scope::CanonicalUrl;

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchPurpose {
    Discovery,
    Extraction,
}

#[async_trait]
pub trait FetchBackend: Send + Sync {
    async fn fetch(&self, url: &CanonicalUrl, purpose: FetchPurpose) -> Result<String, FetchError>;

    fn renders_scripts(&self) -> bool {
        false
    }

    fn max_in_flight(&self) -> usize {
        usize::MAX
    }

    fn label(&self) -> &'static str;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new() -> Result<Self, reqwest::Error> {
        Self::with_timeout(FETCH_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FetchBackend for HttpBackend {
    async fn fetch(&self, url: &CanonicalUrl, _purpose: FetchPurpose) -> Result<String, FetchError> {
        let response = self.client.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        let body = response.text().await?;
        debug!("fetched {} bytes from {}", body.len(), url);
        Ok(body)
    }

    fn label(&self) -> &'static str {
        "http"
    }
}
