use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::app::extract::format_record;
use crate::app::scope::{CanonicalUrl, ScopeSpec};
use crate::app::types::{CrawlEvent, EventSink, PageRecord};

const HEADER_RULE_WIDTH: usize = 80;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLabel {
    pub site: String,
    pub scope: String,
    pub file_stem: String,
    pub started_at: DateTime<Local>,
}

impl RunLabel {
    pub fn for_scope(scope: &ScopeSpec, started_at: DateTime<Local>) -> Self {
        let domain = sanitize_component(scope.domain());
        let path = sanitize_component(scope.base_path());
        let file_stem = if path.is_empty() {
            domain
        } else {
            format!("{domain}_{path}")
        };
        Self {
            site: scope.domain().to_string(),
            scope: format!("{}*", scope.base_path()),
            file_stem,
            started_at,
        }
    }

    pub fn for_seed_list(seeds: &[CanonicalUrl], kind: &str, started_at: DateTime<Local>) -> Self {
        let mut sites: Vec<String> = Vec::new();
        for seed in seeds {
            let authority = seed.authority();
            if !sites.contains(&authority) {
                sites.push(authority);
            }
        }
        let first = sites
            .first()
            .map(|s| sanitize_component(s))
            .unwrap_or_else(|| "sites".to_string());
        Self {
            site: sites.join(", "),
            scope: format!("{} seed URLs", seeds.len()),
            file_stem: format!("{first}_{kind}"),
            started_at,
        }
    }

    pub fn timestamp_slug(&self) -> String {
        self.started_at.format("%Y%m%d_%H%M%S").to_string()
    }

    pub fn content_base_name(&self) -> String {
        format!("{}_all_content_{}", self.file_stem, self.timestamp_slug())
    }
}

fn sanitize_component(raw: &str) -> String {
    raw.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunTotals {
    pub discovered: usize,
    pub processed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk<'a> {
    pub index: usize,
    pub total: usize,
    pub records: &'a [PageRecord],
    pub first_page: usize,
    pub last_page: usize,
    pub header: String,
}

impl OutputChunk<'_> {
    pub fn render(&self) -> String {
        let body = self
            .records
            .iter()
            .map(format_record)
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}{body}", self.header)
    }

    pub fn file_name(&self, base_name: &str) -> String {
        format!("{base_name}_part{}_of_{}.txt", self.index, self.total)
    }
}

pub fn chunk_count(records: usize, chunk_size: usize) -> usize {
    records.div_ceil(chunk_size.max(1))
}

pub fn partition<'a>(
    records: &'a [PageRecord],
    chunk_size: usize,
    label: &RunLabel,
    totals: RunTotals,
) -> Vec<OutputChunk<'a>> {
    let chunk_size = chunk_size.max(1);
    let total = chunk_count(records.len(), chunk_size);
    records
        .chunks(chunk_size)
        .enumerate()
        .map(|(i, slice)| {
            let first_page = i * chunk_size + 1;
            let last_page = first_page + slice.len() - 1;
            OutputChunk {
                index: i + 1,
                total,
                records: slice,
                first_page,
                last_page,
                header: chunk_header(label, totals, i + 1, total, slice.len(), first_page, last_page),
            }
        })
        .collect()
}

pub fn chunk_header(
    label: &RunLabel,
    totals: RunTotals,
    index: usize,
    total: usize,
    page_count: usize,
    first_page: usize,
    last_page: usize,
) -> String {
    let rule = "=".repeat(HEADER_RULE_WIDTH);
    format!(
        "Full site content for NotebookLM (part {index}/{total})\n\
         Site: {site}\n\
         Scope: {scope}\n\
         Extracted at: {at}\n\
         Pages discovered: {discovered}\n\
         Pages retrieved: {processed}\n\
         This file: {page_count} pages (pages {first_page}-{last_page})\n\
         \n\
         {rule}\n\
         \n",
        site = label.site,
        scope = label.scope,
        at = label.started_at.format("%Y-%m-%d %H:%M:%S"),
        discovered = totals.discovered,
        processed = totals.processed,
    )
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct WriteReport {
    pub written: Vec<(PathBuf, f64)>,
    pub failed: Vec<(PathBuf, String)>,
}

/// Writes each chunk through a temporary file and a rename, so a failed chunk
/// never leaves a partial file behind. Failures are reported and skipped.
pub fn write_chunks(
    chunks: &[OutputChunk<'_>],
    output_dir: &Path,
    base_name: &str,
    tx: &EventSink,
) -> WriteReport {
    let mut report = WriteReport::default();
    for chunk in chunks {
        let path = output_dir.join(chunk.file_name(base_name));
        let content = chunk.render();
        match write_atomically(&path, &content) {
            Ok(()) => {
                let size_kb = content.len() as f64 / 1024.0;
                let _ = tx.send(CrawlEvent::ChunkWritten {
                    path: path.clone(),
                    size_kb,
                });
                report.written.push((path, size_kb));
            }
            Err(err) => {
                let _ = tx.send(CrawlEvent::ChunkFailed {
                    path: path.clone(),
                    reason: err.to_string(),
                });
                report.failed.push((path, err.to_string()));
            }
        }
    }
    report
}

pub fn write_atomically(path: &Path, content: &str) -> io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".partial");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio::sync::mpsc;

    use crate::app::types::PageOutcome;

    fn label() -> RunLabel {
        let scope = ScopeSpec::new("a.example", "/docs/");
        let at = Local
            .with_ymd_and_hms(2026, 3, 4, 5, 6, 7)
            .single()
            .expect("unambiguous time");
        RunLabel::for_scope(&scope, at)
    }

    fn records(n: usize) -> Vec<PageRecord> {
        (0..n)
            .map(|i| PageRecord {
                url: CanonicalUrl::parse(&format!("https://a.example/docs/{i:03}"))
                    .expect("url"),
                title: format!("Page {i}"),
                body_text: format!("body {i}"),
                extracted_at: chrono::Utc::now(),
                outcome: PageOutcome::Extracted,
            })
            .collect()
    }

    const TOTALS: RunTotals = RunTotals {
        discovered: 90,
        processed: 85,
    };

    #[test]
    fn eighty_five_records_split_into_eighty_and_five() {
        let records = records(85);
        let chunks = partition(&records, 80, &label(), TOTALS);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].records.len(), 80);
        assert_eq!(chunks[1].records.len(), 5);
        assert_eq!((chunks[1].first_page, chunks[1].last_page), (81, 85));

        let rejoined = chunks
            .iter()
            .flat_map(|c| c.records.iter().cloned())
            .collect::<Vec<_>>();
        assert_eq!(rejoined, records);
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 80), 0);
        assert_eq!(chunk_count(80, 80), 1);
        assert_eq!(chunk_count(81, 80), 2);
        assert_eq!(chunk_count(3, 0), 3);
        assert!(partition(&[], 80, &label(), TOTALS).is_empty());
    }

    #[test]
    fn header_states_position_and_page_range() {
        let records = records(85);
        let chunks = partition(&records, 80, &label(), TOTALS);
        let header = &chunks[1].header;
        assert!(header.starts_with("Full site content for NotebookLM (part 2/2)\n"));
        assert!(header.contains("Site: a.example\n"));
        assert!(header.contains("Scope: /docs/*\n"));
        assert!(header.contains("Extracted at: 2026-03-04 05:06:07\n"));
        assert!(header.contains("Pages discovered: 90\nPages retrieved: 85\n"));
        assert!(header.contains("This file: 5 pages (pages 81-85)\n"));
        assert_eq!(
            header,
            &chunk_header(&label(), TOTALS, 2, 2, 5, 81, 85),
            "headers are independent of neighbouring chunks"
        );
    }

    #[test]
    fn file_names_encode_domain_path_time_and_part() {
        let label = label();
        assert_eq!(
            label.content_base_name(),
            "a_example_docs_all_content_20260304_050607"
        );
        let records = records(3);
        let chunks = partition(&records, 2, &label, TOTALS);
        assert_eq!(
            chunks[0].file_name(&label.content_base_name()),
            "a_example_docs_all_content_20260304_050607_part1_of_2.txt"
        );

        let root = RunLabel::for_scope(&ScopeSpec::new("a.example", "/"), label.started_at);
        assert_eq!(root.file_stem, "a_example");
    }

    #[test]
    fn seed_list_label_lists_each_site_once() {
        let seeds = ["https://a.example/x", "https://b.example/y", "https://a.example/z"]
            .iter()
            .map(|raw| CanonicalUrl::parse(raw).expect("url"))
            .collect::<Vec<_>>();
        let label = RunLabel::for_seed_list(&seeds, "multi", label().started_at);
        assert_eq!(label.site, "a.example, b.example");
        assert_eq!(label.scope, "3 seed URLs");
        assert_eq!(label.file_stem, "a_example_multi");
    }

    #[test]
    fn written_chunks_contain_header_and_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, mut rx) = mpsc::unbounded_channel();
        let records = records(3);
        let label = label();
        let chunks = partition(&records, 2, &label, TOTALS);
        let report = write_chunks(&chunks, dir.path(), &label.content_base_name(), &tx);

        assert_eq!(report.written.len(), 2);
        assert!(report.failed.is_empty());
        let first = fs::read_to_string(&report.written[0].0).expect("chunk 1");
        assert!(first.starts_with("Full site content for NotebookLM (part 1/2)"));
        assert!(first.contains("URL: https://a.example/docs/000\nTitle: Page 0\n"));
        assert!(first.contains("URL: https://a.example/docs/001"));
        assert!(!first.contains("docs/002"));
        assert!(matches!(rx.try_recv(), Ok(CrawlEvent::ChunkWritten { .. })));
    }

    #[test]
    fn failed_chunk_does_not_block_the_others() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, _rx) = mpsc::unbounded_channel();
        let records = records(3);
        let label = label();
        let base = label.content_base_name();
        let chunks = partition(&records, 2, &label, TOTALS);
        // A directory squatting on the first chunk's name makes its rename fail.
        fs::create_dir(dir.path().join(chunks[0].file_name(&base))).expect("blocker");

        let report = write_chunks(&chunks, dir.path(), &base, &tx);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.written.len(), 1);
        assert!(report.written[0].0.ends_with(chunks[1].file_name(&base)));
        assert!(!dir.path().join(format!("{}.partial", chunks[0].file_name(&base))).exists());
    }
}
