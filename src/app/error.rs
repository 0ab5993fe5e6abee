use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("either a URL or --url-list is required")]
    MissingSeed,
    #[error("a URL and --url-list cannot be combined")]
    ConflictingSeeds,
    #[error("--exact-urls requires --url-list")]
    ExactUrlsWithoutList,
    #[error("--sitemap requires a single URL, not --url-list")]
    SitemapWithUrlList,
    #[error("--sitemap cannot be combined with --exact-urls")]
    SitemapWithExactUrls,
    #[error("invalid seed URL '{0}': only absolute http(s) URLs are supported")]
    InvalidSeedUrl(String),
    #[error("--{flag} must be greater than zero")]
    ZeroValue { flag: &'static str },
    #[error("--delay must be a finite, non-negative number of seconds")]
    InvalidDelay,
    #[error("--concurrency above 1 is not supported with --javascript")]
    ConcurrentBrowser,
}

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("cannot read seed list {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse seed list {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("no valid URLs found in {0}")]
    Empty(PathBuf),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("HTTP {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("browser error: {0}")]
    Browser(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum WebDriverError {
    #[error("invalid webdriver url: {0}")]
    InvalidEndpoint(String),
    #[error("webdriver client build failed: {0}")]
    Client(#[from] reqwest::Error),
    #[error("webdriver not reachable at {endpoint}: {reason}")]
    Unavailable { endpoint: String, reason: String },
    #[error("session create failed: {0}")]
    Session(String),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Seeds(#[from] SeedError),
    #[error("headless backend failed to start: {0}")]
    WebDriver(#[from] WebDriverError),
    #[error("HTTP client setup failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
