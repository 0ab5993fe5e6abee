use std::collections::HashSet;

use chrono::Utc;
use scraper::{ElementRef, Html, Selector};

use crate::app::scope::{CanonicalUrl, normalize};
use crate::app::types::{PageMeta, PageOutcome, PageRecord};

pub const NO_TITLE: &str = "no title";

const BOILERPLATE_ELEMENTS: &str = "script, style, nav, footer, header, aside";

const CONTENT_SELECTORS: [&str; 6] = [
    "main",
    "article",
    ".content",
    ".main-content",
    "#content",
    "#main",
];

const ARIA_MAIN_SELECTOR: &str = "[role=\"main\"]";

const RECORD_RULE_WIDTH: usize = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor {
    aria_main: bool,
}

impl Extractor {
    pub fn new(aria_main: bool) -> Self {
        Self { aria_main }
    }

    fn content_chain(&self) -> Vec<&'static str> {
        let mut chain = CONTENT_SELECTORS.to_vec();
        if self.aria_main {
            chain.push(ARIA_MAIN_SELECTOR);
        }
        chain
    }

    pub fn extract(&self, html: &str, url: &CanonicalUrl) -> PageRecord {
        let mut doc = Html::parse_document(html);
        strip_boilerplate(&mut doc);

        let title = match first_text(&doc, "title") {
            Some(title) => title,
            None => NO_TITLE.to_string(),
        };

        let region = self.select_region(&doc);
        let body_text = flatten_text(region);

        PageRecord {
            url: url.clone(),
            title,
            body_text,
            extracted_at: Utc::now(),
            outcome: PageOutcome::Extracted,
        }
    }

    fn select_region<'a>(&self, doc: &'a Html) -> ElementRef<'a> {
        self.content_chain()
            .into_iter()
            .chain(["body"])
            .find_map(|selector| select_first(doc, selector))
            .unwrap_or_else(|| doc.root_element())
    }
}

fn strip_boilerplate(doc: &mut Html) {
    let Ok(selector) = Selector::parse(BOILERPLATE_ELEMENTS) else {
        return;
    };
    let ids = doc.select(&selector).map(|el| el.id()).collect::<Vec<_>>();
    for id in ids {
        if let Some(mut node) = doc.tree.get_mut(id) {
            node.detach();
        }
    }
}

// Walks from the root so detached boilerplate subtrees are never matched.
fn select_first<'a>(doc: &'a Html, selector: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(selector).ok()?;
    doc.root_element().select(&selector).next()
}

fn first_text(doc: &Html, selector: &str) -> Option<String> {
    let el = select_first(doc, selector)?;
    let text = el.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

fn flatten_text(region: ElementRef<'_>) -> String {
    let joined = region
        .text()
        .map(str::trim)
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    collapse_blank_lines(&joined)
}

pub fn collapse_blank_lines(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_blank_run = false;
    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !in_blank_run && !lines.is_empty() {
                lines.push("");
            }
            in_blank_run = true;
        } else {
            lines.push(line);
            in_blank_run = false;
        }
    }
    while lines.last() == Some(&"") {
        lines.pop();
    }
    lines.join("\n")
}

pub fn format_record(record: &PageRecord) -> String {
    let rule = "=".repeat(RECORD_RULE_WIDTH);
    match &record.outcome {
        PageOutcome::Extracted => format!(
            "\n{rule}\nURL: {}\nTitle: {}\n{rule}\n\n{}\n\n",
            record.url, record.title, record.body_text
        ),
        PageOutcome::Failed(reason) => {
            format!("\n{rule}\nURL: {}\nError: {reason}\n{rule}\n\n", record.url)
        }
    }
}

pub fn extract_links(html: &str, page_url: &CanonicalUrl) -> Vec<CanonicalUrl> {
    let doc = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for el in doc.select(&selector) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Some(resolved) = normalize(href, page_url) else {
            continue;
        };
        if seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    out
}

fn normalize_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_first_text(doc: &Html, selector: &str) -> String {
    let Ok(selector) = Selector::parse(selector) else {
        return String::new();
    };

    for el in doc.select(&selector) {
        let text = normalize_text(&el.text().collect::<Vec<_>>().join(" "));
        if !text.is_empty() {
            return text;
        }
    }

    String::new()
}

fn extract_meta_content(doc: &Html, selector: &str) -> String {
    let Ok(selector) = Selector::parse(selector) else {
        return String::new();
    };

    doc.select(&selector)
        .find_map(|el| el.value().attr("content"))
        .map(normalize_text)
        .unwrap_or_default()
}

fn extract_title(doc: &Html) -> String {
    let title = extract_first_text(doc, "title");
    if !title.is_empty() {
        return title;
    }
    let og_title = extract_meta_content(doc, "meta[property=\"og:title\"]");
    if !og_title.is_empty() {
        return og_title;
    }
    extract_meta_content(doc, "meta[name=\"twitter:title\"]")
}

pub fn extract_meta(html: &str, url: &CanonicalUrl) -> PageMeta {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);
    PageMeta {
        url: url.clone(),
        title: if title.is_empty() {
            NO_TITLE.to_string()
        } else {
            title
        },
        h1: extract_first_text(&doc, "h1"),
        status: "OK".to_string(),
    }
}
