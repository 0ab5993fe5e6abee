use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::app::error::ConfigError;
use crate::app::scope::CanonicalUrl;
use crate::app::sitemap::SitemapFormat;
use crate::app::webdriver::DEFAULT_WEBDRIVER_URL;

#[derive(Debug, Parser, Clone)]
#[command(
    name = "sitetext",
    version,
    about = "Crawl a documentation site and export its text as NotebookLM-sized files"
)]
pub struct Cli {
    /// Start page; the crawl stays on its host under the derived base path.
    #[arg(value_name = "URL")]
    pub url: Option<String>,

    /// File with one URL per line, or a CSV with a `url` column.
    #[arg(long, value_name = "FILE")]
    pub url_list: Option<PathBuf>,

    #[arg(long, value_name = "N", default_value_t = 1000)]
    pub max_pages: usize,

    /// Extract every discovered page.
    #[arg(long, default_value_t = false)]
    pub no_limit: bool,

    /// Seconds between requests.
    #[arg(long, value_name = "SECS", default_value_t = 1.0)]
    pub delay: f64,

    /// Path prefix that bounds the crawl, e.g. /run/docs/.
    #[arg(long, value_name = "PATH")]
    pub base_path: Option<String>,

    #[arg(long, value_name = "N", default_value_t = 80)]
    pub pages_per_file: usize,

    /// Render pages in headless Chrome through WebDriver.
    #[arg(long, default_value_t = false)]
    pub javascript: bool,

    /// Fetch only the listed URLs, without following links.
    #[arg(long, default_value_t = false)]
    pub exact_urls: bool,

    /// Write a title/heading listing instead of page text.
    #[arg(long, default_value_t = false)]
    pub sitemap: bool,

    #[arg(long, value_enum, default_value_t = SitemapFormat::Csv)]
    pub sitemap_format: SitemapFormat,

    #[arg(long, value_name = "DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Extraction fetches in flight at once (static fetching only).
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub concurrency: usize,

    #[arg(long, value_name = "URL", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver_url: String,

    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    SingleSeed(CanonicalUrl),
    MultiSeed(PathBuf),
    ExactUrls(PathBuf),
    Sitemap {
        seed: CanonicalUrl,
        format: SitemapFormat,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendChoice {
    Http,
    Headless { endpoint: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrawlSettings {
    pub max_pages: Option<usize>,
    pub delay: Duration,
    pub base_path: Option<String>,
    pub pages_per_file: usize,
    pub concurrency: usize,
    pub output_dir: PathBuf,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            max_pages: Some(1000),
            delay: Duration::from_secs(1),
            base_path: None,
            pages_per_file: 80,
            concurrency: 1,
            output_dir: PathBuf::from("."),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub mode: RunMode,
    pub backend: BackendChoice,
    pub settings: CrawlSettings,
    pub verbose: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<RunConfig, ConfigError> {
        if self.sitemap && self.exact_urls {
            return Err(ConfigError::SitemapWithExactUrls);
        }

        let mode = match (self.url, self.url_list) {
            (Some(_), Some(_)) => return Err(ConfigError::ConflictingSeeds),
            (None, None) => return Err(ConfigError::MissingSeed),
            (Some(raw), None) => {
                if self.exact_urls {
                    return Err(ConfigError::ExactUrlsWithoutList);
                }
                let seed = parse_seed_url(&raw)?;
                if self.sitemap {
                    RunMode::Sitemap {
                        seed,
                        format: self.sitemap_format,
                    }
                } else {
                    RunMode::SingleSeed(seed)
                }
            }
            (None, Some(list)) => {
                if self.sitemap {
                    return Err(ConfigError::SitemapWithUrlList);
                }
                if self.exact_urls {
                    RunMode::ExactUrls(list)
                } else {
                    RunMode::MultiSeed(list)
                }
            }
        };

        if self.pages_per_file == 0 {
            return Err(ConfigError::ZeroValue {
                flag: "pages-per-file",
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::ZeroValue {
                flag: "concurrency",
            });
        }
        let max_pages = if self.no_limit {
            None
        } else if self.max_pages == 0 {
            return Err(ConfigError::ZeroValue { flag: "max-pages" });
        } else {
            Some(self.max_pages)
        };
        let delay =
            Duration::try_from_secs_f64(self.delay).map_err(|_| ConfigError::InvalidDelay)?;

        let backend = if self.javascript {
            if self.concurrency > 1 {
                return Err(ConfigError::ConcurrentBrowser);
            }
            BackendChoice::Headless {
                endpoint: self.webdriver_url,
            }
        } else {
            BackendChoice::Http
        };

        Ok(RunConfig {
            mode,
            backend,
            settings: CrawlSettings {
                max_pages,
                delay,
                base_path: self.base_path,
                pages_per_file: self.pages_per_file,
                concurrency: self.concurrency,
                output_dir: self.output_dir,
            },
            verbose: self.verbose,
        })
    }
}

fn parse_seed_url(raw: &str) -> Result<CanonicalUrl, ConfigError> {
    CanonicalUrl::parse(raw.trim()).ok_or_else(|| ConfigError::InvalidSeedUrl(raw.to_string()))
}
