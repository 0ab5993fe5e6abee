use std::fs;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::debug;

use crate::app::config::CrawlSettings;
use crate::app::error::{Error, FetchError};
use crate::app::extract::Extractor;
use crate::app::fetch::{FetchBackend, FetchPurpose};
use crate::app::frontier::discover;
use crate::app::partition::{RunLabel, RunTotals, WriteReport, partition, write_chunks};
use crate::app::scope::{CanonicalUrl, ScopeSpec};
use crate::app::sitemap::{SitemapFormat, collect_page_meta, write_sitemap};
use crate::app::types::{CrawlEvent, EventSink, PageRecord, RunSummary, send_status};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedCrawl {
    pub discovered: usize,
    pub records: Vec<PageRecord>,
}

impl SeedCrawl {
    pub fn processed(&self) -> usize {
        self.records.iter().filter(|r| r.is_ok()).count()
    }
}

pub fn select_pages(mut urls: Vec<CanonicalUrl>, limit: Option<usize>) -> Vec<CanonicalUrl> {
    if let Some(limit) = limit {
        urls.truncate(limit);
    }
    urls
}

pub fn eta_minutes(pages: usize, delay: Duration) -> f64 {
    pages as f64 * delay.as_secs_f64() / 60.0
}

pub struct Pipeline {
    backend: Arc<dyn FetchBackend>,
    settings: CrawlSettings,
    extractor: Extractor,
    tx: EventSink,
}

impl Pipeline {
    pub fn new(backend: Arc<dyn FetchBackend>, settings: CrawlSettings, tx: EventSink) -> Self {
        let extractor = Extractor::new(backend.renders_scripts());
        Self {
            backend,
            settings,
            extractor,
            tx,
        }
    }

    pub async fn crawl_seed(&self, seed: &CanonicalUrl) -> SeedCrawl {
        let scope = ScopeSpec::for_seed(seed, self.settings.base_path.as_deref());
        let urls = discover(
            seed,
            &scope,
            self.backend.as_ref(),
            self.settings.delay,
            &self.tx,
        )
        .await;
        let discovered = urls.len();
        let selected = select_pages(urls, self.settings.max_pages);

        let _ = self.tx.send(CrawlEvent::Plan {
            discovered,
            selected: selected.len(),
            limit: self.settings.max_pages,
            eta_minutes: eta_minutes(selected.len(), self.settings.delay),
        });

        let records = self.extract_pages(&selected).await;
        SeedCrawl {
            discovered,
            records,
        }
    }

    pub async fn extract_pages(&self, urls: &[CanonicalUrl]) -> Vec<PageRecord> {
        let limit = self
            .settings
            .concurrency
            .min(self.backend.max_in_flight())
            .max(1);
        if limit == 1 || urls.len() < 2 {
            self.extract_sequential(urls).await
        } else {
            self.extract_concurrent(urls, limit).await
        }
    }

    async fn extract_sequential(&self, urls: &[CanonicalUrl]) -> Vec<PageRecord> {
        let mut records = Vec::with_capacity(urls.len());
        for (idx, url) in urls.iter().enumerate() {
            let fetched = self.backend.fetch(url, FetchPurpose::Extraction).await;
            records.push(self.finish_page(url, fetched, idx + 1, urls.len()));
            if idx + 1 < urls.len() && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay).await;
            }
        }
        records
    }

    /// Starts at most one fetch per delay interval with up to `limit` in
    /// flight; results are slotted back by index.
    async fn extract_concurrent(&self, urls: &[CanonicalUrl], limit: usize) -> Vec<PageRecord> {
        let mut slots: Vec<Option<PageRecord>> = vec![None; urls.len()];
        let mut tasks = JoinSet::new();
        let mut next = 0;
        let mut done = 0;
        let mut last_start: Option<Instant> = None;

        while next < urls.len() || !tasks.is_empty() {
            while next < urls.len() && tasks.len() < limit {
                if let Some(started) = last_start {
                    tokio::time::sleep_until(started + self.settings.delay).await;
                }
                last_start = Some(Instant::now());
                let backend = Arc::clone(&self.backend);
                let url = urls[next].clone();
                let idx = next;
                tasks.spawn(async move {
                    let fetched = backend.fetch(&url, FetchPurpose::Extraction).await;
                    (idx, fetched)
                });
                next += 1;
            }

            match tasks.join_next().await {
                Some(Ok((idx, fetched))) => {
                    done += 1;
                    slots[idx] = Some(self.finish_page(&urls[idx], fetched, done, urls.len()));
                }
                Some(Err(err)) => debug!("extraction task aborted: {err}"),
                None => {}
            }
        }

        slots
            .into_iter()
            .zip(urls)
            .map(|(slot, url)| {
                slot.unwrap_or_else(|| PageRecord::failed(url.clone(), "extraction task aborted"))
            })
            .collect()
    }

    fn finish_page(
        &self,
        url: &CanonicalUrl,
        fetched: Result<String, FetchError>,
        done: usize,
        of: usize,
    ) -> PageRecord {
        let record = match fetched {
            Ok(html) => self.extractor.extract(&html, url),
            Err(err) => {
                let _ = self.tx.send(CrawlEvent::Unretrieved {
                    url: url.clone(),
                    reason: err.to_string(),
                });
                PageRecord::failed(url.clone(), err.to_string())
            }
        };
        let _ = self.tx.send(CrawlEvent::Extracted {
            url: url.clone(),
            done,
            of,
        });
        record
    }

    pub async fn run_single(&self, seed: &CanonicalUrl) -> Result<RunSummary, Error> {
        let started_at = Local::now();
        let scope = ScopeSpec::for_seed(seed, self.settings.base_path.as_deref());
        let crawl = self.crawl_seed(seed).await;
        let label = RunLabel::for_scope(&scope, started_at);
        self.write_output(&label, crawl)
    }

    pub async fn run_multi(&self, seeds: &[CanonicalUrl]) -> Result<RunSummary, Error> {
        let started_at = Local::now();
        let mut combined = SeedCrawl::default();
        for (idx, seed) in seeds.iter().enumerate() {
            send_status(
                &self.tx,
                format!("seed {}/{}: {seed}", idx + 1, seeds.len()),
            );
            let crawl = self.crawl_seed(seed).await;
            combined.discovered += crawl.discovered;
            combined.records.extend(crawl.records);
            if idx + 1 < seeds.len() && !self.settings.delay.is_zero() {
                tokio::time::sleep(self.settings.delay * 2).await;
            }
        }
        let label = RunLabel::for_seed_list(seeds, "multi", started_at);
        self.write_output(&label, combined)
    }

    pub async fn run_exact(&self, urls: &[CanonicalUrl]) -> Result<RunSummary, Error> {
        let started_at = Local::now();
        let _ = self.tx.send(CrawlEvent::Plan {
            discovered: urls.len(),
            selected: urls.len(),
            limit: None,
            eta_minutes: eta_minutes(urls.len(), self.settings.delay),
        });
        let records = self.extract_pages(urls).await;
        let label = RunLabel::for_seed_list(urls, "exact", started_at);
        self.write_output(
            &label,
            SeedCrawl {
                discovered: urls.len(),
                records,
            },
        )
    }

    pub async fn run_sitemap(
        &self,
        seed: &CanonicalUrl,
        format: SitemapFormat,
    ) -> Result<RunSummary, Error> {
        let started_at = Local::now();
        let scope = ScopeSpec::for_seed(seed, self.settings.base_path.as_deref());
        let urls = discover(
            seed,
            &scope,
            self.backend.as_ref(),
            self.settings.delay,
            &self.tx,
        )
        .await;
        let discovered = urls.len();
        let selected = select_pages(urls, self.settings.max_pages);
        let _ = self.tx.send(CrawlEvent::Plan {
            discovered,
            selected: selected.len(),
            limit: self.settings.max_pages,
            eta_minutes: eta_minutes(selected.len(), self.settings.delay),
        });

        let pages =
            collect_page_meta(&selected, self.backend.as_ref(), self.settings.delay, &self.tx)
                .await;
        self.ensure_output_dir()?;
        let label = RunLabel::for_scope(&scope, started_at);
        let path = write_sitemap(
            &pages,
            format,
            &label,
            scope.base_path(),
            &self.settings.output_dir,
        )?;

        let processed = pages.iter().filter(|p| p.status == "OK").count();
        Ok(RunSummary {
            discovered,
            selected: pages.len(),
            processed,
            failed: pages.len() - processed,
            files: vec![path],
            unwritten: Vec::new(),
        })
    }

    fn ensure_output_dir(&self) -> Result<(), Error> {
        let dir = &self.settings.output_dir;
        fs::create_dir_all(dir).map_err(|source| Error::Output {
            path: dir.clone(),
            source,
        })
    }

    fn write_output(&self, label: &RunLabel, crawl: SeedCrawl) -> Result<RunSummary, Error> {
        if crawl.records.is_empty() {
            send_status(&self.tx, "no pages retrieved; nothing to write");
            return Ok(summarize(&crawl, WriteReport::default()));
        }

        self.ensure_output_dir()?;
        let totals = RunTotals {
            discovered: crawl.discovered,
            processed: crawl.processed(),
        };
        let chunks = partition(&crawl.records, self.settings.pages_per_file, label, totals);
        let report = write_chunks(
            &chunks,
            &self.settings.output_dir,
            &label.content_base_name(),
            &self.tx,
        );
        Ok(summarize(&crawl, report))
    }
}

fn summarize(crawl: &SeedCrawl, report: WriteReport) -> RunSummary {
    let processed = crawl.processed();
    RunSummary {
        discovered: crawl.discovered,
        selected: crawl.records.len(),
        processed,
        failed: crawl.records.len() - processed,
        files: report.written.into_iter().map(|(path, _)| path).collect(),
        unwritten: report.failed.into_iter().map(|(path, _)| path).collect(),
    }
}
