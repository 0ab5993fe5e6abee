use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::app::error::Error;
use crate::app::extract::{NO_TITLE, extract_meta};
use crate::app::fetch::{FetchBackend, FetchPurpose};
use crate::app::partition::{RunLabel, write_atomically};
use crate::app::scope::CanonicalUrl;
use crate::app::types::{CrawlEvent, EventSink, PageMeta};

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum SitemapFormat {
    Csv,
    Text,
}

impl SitemapFormat {
    fn extension(self) -> &'static str {
        match self {
            SitemapFormat::Csv => "csv",
            SitemapFormat::Text => "txt",
        }
    }
}

#[derive(Debug, Serialize)]
struct SitemapRow<'a> {
    #[serde(rename = "URL")]
    url: &'a str,
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "H1")]
    h1: &'a str,
    #[serde(rename = "Status")]
    status: &'a str,
}

pub async fn collect_page_meta(
    urls: &[CanonicalUrl],
    backend: &dyn FetchBackend,
    delay: Duration,
    tx: &EventSink,
) -> Vec<PageMeta> {
    let mut pages = Vec::with_capacity(urls.len());
    for (idx, url) in urls.iter().enumerate() {
        let meta = match backend.fetch(url, FetchPurpose::Extraction).await {
            Ok(html) => extract_meta(&html, url),
            Err(err) => {
                let _ = tx.send(CrawlEvent::Unretrieved {
                    url: url.clone(),
                    reason: err.to_string(),
                });
                PageMeta {
                    url: url.clone(),
                    title: NO_TITLE.to_string(),
                    h1: String::new(),
                    status: format!("ERROR: {err}"),
                }
            }
        };
        let _ = tx.send(CrawlEvent::Extracted {
            url: url.clone(),
            done: idx + 1,
            of: urls.len(),
        });
        pages.push(meta);
        if idx + 1 < urls.len() && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    pages
}

pub fn write_sitemap_csv<W: Write>(writer: W, pages: &[PageMeta]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(writer);
    for page in pages {
        writer.serialize(SitemapRow {
            url: page.url.as_str(),
            title: &page.title,
            h1: &page.h1,
            status: &page.status,
        })?;
    }
    if pages.is_empty() {
        writer.write_record(["URL", "Title", "H1", "Status"])?;
    }
    writer.flush()?;
    Ok(())
}

/// Indented listing; nesting follows path depth below `base_path`.
pub fn render_sitemap_text(pages: &[PageMeta], label: &RunLabel, base_path: &str) -> String {
    let mut out = format!(
        "Sitemap for {}{}\nGenerated: {}\nPages: {}\n\n",
        label.site,
        label.scope,
        label.started_at.format("%Y-%m-%d %H:%M:%S"),
        pages.len()
    );
    for page in pages {
        let indent = "  ".repeat(depth_below(page.url.path(), base_path));
        out.push_str(&format!("{indent}- {}\n", page.title));
        out.push_str(&format!("{indent}    URL: {}\n", page.url));
        if !page.h1.is_empty() {
            out.push_str(&format!("{indent}    H1: {}\n", page.h1));
        }
        out.push_str(&format!("{indent}    Status: {}\n", page.status));
    }
    out
}

fn depth_below(path: &str, base_path: &str) -> usize {
    path.strip_prefix(base_path)
        .unwrap_or(path)
        .split('/')
        .filter(|segment| !segment.is_empty())
        .count()
        .saturating_sub(1)
}

pub fn sitemap_file_name(label: &RunLabel, format: SitemapFormat) -> String {
    format!(
        "{}_sitemap_{}.{}",
        label.file_stem,
        label.timestamp_slug(),
        format.extension()
    )
}

pub fn write_sitemap(
    pages: &[PageMeta],
    format: SitemapFormat,
    label: &RunLabel,
    base_path: &str,
    output_dir: &Path,
) -> Result<PathBuf, Error> {
    let path = output_dir.join(sitemap_file_name(label, format));
    let output_err = |source: std::io::Error| Error::Output {
        path: path.clone(),
        source,
    };
    let content = match format {
        SitemapFormat::Csv => {
            let mut buf = Vec::new();
            write_sitemap_csv(&mut buf, pages)
                .map_err(|e| output_err(std::io::Error::other(e)))?;
            String::from_utf8(buf).map_err(|e| output_err(std::io::Error::other(e)))?
        }
        SitemapFormat::Text => render_sitemap_text(pages, label, base_path),
    };
    write_atomically(&path, &content).map_err(output_err)?;
    Ok(path)
}
