use std::fs;
use std::path::Path;

use crate::app::error::SeedError;
use crate::app::scope::CanonicalUrl;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedList {
    pub urls: Vec<CanonicalUrl>,
    pub rejected: Vec<(usize, String)>,
}

impl SeedList {
    fn push_candidate(&mut self, line_no: usize, raw: &str) {
        let candidate = raw.trim();
        if candidate.is_empty() || candidate.starts_with('#') {
            return;
        }
        let lower = candidate.to_ascii_lowercase();
        let parsed = if lower.starts_with("http://") || lower.starts_with("https://") {
            CanonicalUrl::parse(candidate)
        } else {
            None
        };
        match parsed {
            Some(url) => self.urls.push(url),
            None => self.rejected.push((line_no, candidate.to_string())),
        }
    }
}

pub fn load_seed_file(path: &Path) -> Result<SeedList, SeedError> {
    let list = if is_csv_path(path) {
        let content = fs::read(path).map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        parse_seed_csv(&content).map_err(|source| SeedError::Csv {
            path: path.to_path_buf(),
            source,
        })?
    } else {
        let content = fs::read_to_string(path).map_err(|source| SeedError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        parse_seed_lines(&content)
    };

    if list.urls.is_empty() {
        return Err(SeedError::Empty(path.to_path_buf()));
    }
    Ok(list)
}

fn is_csv_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

pub fn parse_seed_lines(content: &str) -> SeedList {
    let mut list = SeedList::default();
    for (idx, line) in content.lines().enumerate() {
        list.push_candidate(idx + 1, line);
    }
    list
}

/// Uses the `url` column when the first row names one, otherwise the first
/// column of every row.
pub fn parse_seed_csv(content: &[u8]) -> Result<SeedList, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content);

    let mut list = SeedList::default();
    let mut url_column: Option<usize> = None;
    for (idx, record) in reader.records().enumerate() {
        let record = record?;
        if idx == 0 {
            url_column = record
                .iter()
                .position(|field| field.eq_ignore_ascii_case("url"));
            if url_column.is_some() {
                continue;
            }
        }
        let column = url_column.unwrap_or(0);
        if let Some(value) = record.get(column) {
            list.push_candidate(idx + 1, value);
        }
    }
    Ok(list)
}
