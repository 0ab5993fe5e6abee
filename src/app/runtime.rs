use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use crate::app::config::{BackendChoice, Cli, RunConfig, RunMode};
use crate::app::error::Error;
use crate::app::fetch::HttpBackend;
use crate::app::pipeline::Pipeline;
use crate::app::scope::CanonicalUrl;
use crate::app::seeds::load_seed_file;
use crate::app::sitemap::SitemapFormat;
use crate::app::types::{CrawlEvent, EventSink, RunSummary, send_error, send_status};
use crate::app::webdriver::WebDriverBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Job {
    Single(CanonicalUrl),
    Multi(Vec<CanonicalUrl>),
    Exact(Vec<CanonicalUrl>),
    Sitemap(CanonicalUrl, SitemapFormat),
}

pub async fn run() -> Result<RunSummary, Error> {
    let config = Cli::parse().into_config()?;
    init_logging(config.verbose);
    run_with_config(config).await
}

fn init_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    // Already installed when embedded in another program.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub async fn run_with_config(config: RunConfig) -> Result<RunSummary, Error> {
    let (tx, rx) = mpsc::unbounded_channel::<CrawlEvent>();
    let reporter = tokio::spawn(report_events(rx));

    let result = execute(config, tx).await;

    if let Err(e) = reporter.await {
        error!("event reporter join error: {e}");
    }
    result
}

async fn execute(config: RunConfig, tx: EventSink) -> Result<RunSummary, Error> {
    let job = load_job(config.mode, &tx)?;

    let summary = match config.backend {
        BackendChoice::Http => {
            let backend = HttpBackend::new().map_err(Error::HttpClient)?;
            let pipeline = Pipeline::new(Arc::new(backend), config.settings, tx.clone());
            run_job(&pipeline, &job).await?
        }
        BackendChoice::Headless { endpoint } => {
            let browser = Arc::new(WebDriverBackend::start(&endpoint, &tx).await?);
            let pipeline = Pipeline::new(browser.clone(), config.settings, tx.clone());
            let result = run_job(&pipeline, &job).await;
            drop(pipeline);
            match Arc::try_unwrap(browser) {
                Ok(browser) => browser.release(&tx).await,
                Err(_) => send_error(&tx, "headless session still shared; driver stops on exit"),
            }
            result?
        }
    };

    let _ = tx.send(CrawlEvent::Finished(summary.clone()));
    Ok(summary)
}

fn load_job(mode: RunMode, tx: &EventSink) -> Result<Job, Error> {
    let job = match mode {
        RunMode::SingleSeed(seed) => Job::Single(seed),
        RunMode::Sitemap { seed, format } => Job::Sitemap(seed, format),
        RunMode::MultiSeed(path) => Job::Multi(load_seeds(&path, tx)?),
        RunMode::ExactUrls(path) => Job::Exact(load_seeds(&path, tx)?),
    };
    Ok(job)
}

fn load_seeds(path: &Path, tx: &EventSink) -> Result<Vec<CanonicalUrl>, Error> {
    let list = load_seed_file(path)?;
    for (line, content) in &list.rejected {
        send_error(
            tx,
            format!("{}:{line}: skipping '{content}', not an http(s) URL", path.display()),
        );
    }
    send_status(
        tx,
        format!("loaded {} URLs from {}", list.urls.len(), path.display()),
    );
    Ok(list.urls)
}

async fn run_job(pipeline: &Pipeline, job: &Job) -> Result<RunSummary, Error> {
    match job {
        Job::Single(seed) => pipeline.run_single(seed).await,
        Job::Multi(seeds) => pipeline.run_multi(seeds).await,
        Job::Exact(urls) => pipeline.run_exact(urls).await,
        Job::Sitemap(seed, format) => pipeline.run_sitemap(seed, *format).await,
    }
}

async fn report_events(mut rx: UnboundedReceiver<CrawlEvent>) {
    while let Some(event) = rx.recv().await {
        log_event(event);
    }
}

fn log_event(event: CrawlEvent) {
    match event {
        CrawlEvent::Status(message) => info!("{message}"),
        CrawlEvent::Error(message) => warn!("{message}"),
        CrawlEvent::Discovered { url, total } => debug!(total, "discovered {url}"),
        CrawlEvent::Plan {
            discovered,
            selected,
            limit,
            eta_minutes,
        } => {
            info!("{discovered} pages discovered, {selected} selected for extraction");
            match limit {
                Some(limit) if discovered > selected => warn!(
                    "{} pages excluded by the page limit of {limit}",
                    discovered - selected
                ),
                Some(_) => {}
                None => info!("no page limit"),
            }
            info!("estimated time: {eta_minutes:.1} minutes");
        }
        CrawlEvent::Extracted { url, done, of } => info!("[{done}/{of}] {url}"),
        CrawlEvent::Unretrieved { url, reason } => warn!("could not retrieve {url}: {reason}"),
        CrawlEvent::ChunkWritten { path, size_kb } => {
            info!("wrote {} ({size_kb:.1} KB)", path.display())
        }
        CrawlEvent::ChunkFailed { path, reason } => {
            error!("failed to write {}: {reason}", path.display())
        }
        CrawlEvent::Finished(summary) => {
            info!(
                "finished: discovered={} selected={} retrieved={} failed={} files={}",
                summary.discovered,
                summary.selected,
                summary.processed,
                summary.failed,
                summary.files.len()
            );
            for file in &summary.files {
                info!("  {}", file.display());
            }
            if !summary.unwritten.is_empty() {
                error!("{} output files could not be written", summary.unwritten.len());
            }
        }
    }
}
