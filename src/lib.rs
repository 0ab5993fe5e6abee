//! Crawls one section of a website, or a list of pages, and exports the
//! readable text as a series of size-bounded plain-text files.

pub mod app;

pub use app::config::{Cli, CrawlSettings, RunConfig, RunMode};
pub use app::error::{Error, Result};
pub use app::fetch::{FetchBackend, FetchPurpose, HttpBackend};
pub use app::pipeline::Pipeline;
pub use app::runtime::{run, run_with_config};
pub use app::types::{CrawlEvent, PageRecord, RunSummary};
