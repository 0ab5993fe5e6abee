use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::app::extract::extract_links;
use crate::app::fetch::{FetchBackend, FetchPurpose};
use crate::app::scope::{CanonicalUrl, ScopeSpec};
use crate::app::types::{CrawlEvent, CrawlPhase, EventSink, send_error, send_status};

const PROGRESS_EVERY: usize = 10;

#[derive(Debug)]
pub struct Frontier {
    visited: HashSet<CanonicalUrl>,
    queue: VecDeque<CanonicalUrl>,
    phase: CrawlPhase,
}

impl Default for Frontier {
    fn default() -> Self {
        Self::new()
    }
}

impl Frontier {
    pub fn new() -> Self {
        Self {
            visited: HashSet::new(),
            queue: VecDeque::new(),
            phase: CrawlPhase::Pending,
        }
    }

    pub fn enqueue(&mut self, url: CanonicalUrl) -> bool {
        if !self.visited.insert(url.clone()) {
            return false;
        }
        self.queue.push_back(url);
        if self.phase == CrawlPhase::Pending {
            self.phase = CrawlPhase::Discovering;
        }
        true
    }

    pub fn pop(&mut self) -> Option<CanonicalUrl> {
        let next = self.queue.pop_front();
        if next.is_none() && self.phase == CrawlPhase::Discovering {
            self.phase = CrawlPhase::Discovered;
        }
        next
    }

    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    pub fn discovered(&self) -> usize {
        self.visited.len()
    }

    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// Lexicographic order, so a later page limit always keeps the same prefix.
    pub fn into_sorted(self) -> Vec<CanonicalUrl> {
        let mut urls = self.visited.into_iter().collect::<Vec<_>>();
        urls.sort();
        urls
    }
}

pub async fn discover(
    seed: &CanonicalUrl,
    scope: &ScopeSpec,
    backend: &dyn FetchBackend,
    crawl_delay: Duration,
    tx: &EventSink,
) -> Vec<CanonicalUrl> {
    let pause = crawl_delay / 2;
    let mut frontier = Frontier::new();
    frontier.enqueue(seed.clone());

    send_status(
        tx,
        format!(
            "discovering pages under {}{} via {}",
            scope.domain(),
            scope.base_path(),
            backend.label()
        ),
    );

    while let Some(url) = frontier.pop() {
        let _ = tx.send(CrawlEvent::Discovered {
            url: url.clone(),
            total: frontier.discovered(),
        });

        match backend.fetch(&url, FetchPurpose::Discovery).await {
            Ok(html) => {
                for link in extract_links(&html, &url) {
                    if scope.contains(&link) {
                        frontier.enqueue(link);
                    }
                }
            }
            Err(err) => {
                send_error(tx, format!("discovery fetch failed for {url}: {err}"));
            }
        }

        if frontier.discovered() % PROGRESS_EVERY == 0 {
            send_status(tx, format!("discovered {} pages", frontier.discovered()));
        }

        if frontier.has_pending() && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }

    let urls = frontier.into_sorted();
    send_status(tx, format!("discovery finished: {} pages", urls.len()));
    urls
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> CanonicalUrl {
        CanonicalUrl::parse(raw).expect("valid url")
    }

    #[test]
    fn enqueue_marks_visited_immediately() {
        let mut frontier = Frontier::new();
        assert_eq!(frontier.phase(), CrawlPhase::Pending);
        assert!(frontier.enqueue(url("https://a.example/b")));
        assert!(!frontier.enqueue(url("https://a.example/b")));
        assert!(frontier.enqueue(url("https://a.example/a")));
        assert_eq!(frontier.phase(), CrawlPhase::Discovering);
        assert_eq!(frontier.discovered(), 2);

        assert_eq!(frontier.pop(), Some(url("https://a.example/b")));
        // Popped URLs stay visited.
        assert!(!frontier.enqueue(url("https://a.example/b")));
        assert_eq!(frontier.pop(), Some(url("https://a.example/a")));
        assert_eq!(frontier.pop(), None);
        assert_eq!(frontier.phase(), CrawlPhase::Discovered);
    }

    #[test]
    fn sorted_output_is_lexicographic() {
        let mut frontier = Frontier::new();
        for raw in [
            "https://a.example/docs/z",
            "https://a.example/docs/",
            "https://a.example/docs/b?x=1",
            "https://a.example/docs/b",
        ] {
            frontier.enqueue(url(raw));
        }
        let sorted = frontier
            .into_sorted()
            .into_iter()
            .map(|u| u.to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            sorted,
            vec![
                "https://a.example/docs/",
                "https://a.example/docs/b",
                "https://a.example/docs/b?x=1",
                "https://a.example/docs/z",
            ]
        );
    }
}
