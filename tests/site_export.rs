use std::fs;
use std::path::Path;
use std::time::Duration;

use sitetext::app::config::BackendChoice;
use sitetext::app::scope::CanonicalUrl;
use sitetext::app::sitemap::SitemapFormat;
use sitetext::{CrawlSettings, Error, RunConfig, RunMode, run_with_config};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const HOME: &str = r#"<html><head><title>Docs home</title></head><body>
<nav><a href="/docs/guide">Guide</a></nav>
<main>
  <h1>Documentation</h1>
  <p>Start here.</p>
  <a href="api">API</a>
  <a href="/docs/broken#top">Broken</a>
  <a href="/other/">Elsewhere</a>
  <a href="/docs/manual.pdf">Manual</a>
</main>
<footer>Copyright</footer>
</body></html>"#;

const GUIDE: &str = r#"<html><head><title>Guide</title></head><body>
<header>Site header</header>
<article><h1>Getting started</h1><p>Install the tool.</p></article>
</body></html>"#;

const API: &str = r#"<html><head><title>API</title></head><body>
<div class="content"><p>Endpoints are listed below.</p></div>
<aside>Related links</aside>
</body></html>"#;

async fn docs_server() -> MockServer {
    let server = MockServer::start().await;
    for (route, body) in [("/docs/", HOME), ("/docs/guide", GUIDE), ("/docs/api", API)] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/docs/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/other/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<main>Outside</main>"))
        .mount(&server)
        .await;
    server
}

fn seed(server: &MockServer, route: &str) -> CanonicalUrl {
    CanonicalUrl::parse(&format!("{}{route}", server.uri())).expect("seed url")
}

fn config(mode: RunMode, output_dir: &Path) -> RunConfig {
    RunConfig {
        mode,
        backend: BackendChoice::Http,
        settings: CrawlSettings {
            delay: Duration::ZERO,
            pages_per_file: 2,
            output_dir: output_dir.to_path_buf(),
            ..CrawlSettings::default()
        },
        verbose: false,
    }
}

#[tokio::test]
async fn site_section_is_exported_in_chunks() {
    let server = docs_server().await;
    let out = tempfile::tempdir().expect("tempdir");

    let summary = run_with_config(config(
        RunMode::SingleSeed(seed(&server, "/docs/")),
        out.path(),
    ))
    .await
    .expect("run succeeds");

    assert_eq!(summary.discovered, 4);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.files.len(), 2);

    let first_name = summary.files[0]
        .file_name()
        .and_then(|n| n.to_str())
        .expect("file name");
    assert!(first_name.starts_with("127_0_0_1_"));
    assert!(first_name.contains("_docs_all_content_"));
    assert!(first_name.ends_with("_part1_of_2.txt"));

    let first = fs::read_to_string(&summary.files[0]).expect("part 1");
    assert!(first.starts_with("Full site content for NotebookLM (part 1/2)\n"));
    assert!(first.contains("This file: 2 pages (pages 1-2)\n"));
    assert!(first.contains("Title: Docs home\n"));
    assert!(first.contains("Start here."));
    assert!(first.contains("Endpoints are listed below."));
    assert!(!first.contains("Copyright"));
    assert!(!first.contains("Related links"));

    let second = fs::read_to_string(&summary.files[1]).expect("part 2");
    assert!(second.contains("/docs/broken\nError: HTTP 500\n"));
    assert!(second.contains("Install the tool."));
    assert!(!second.contains("Site header"));

    let all = format!("{first}{second}");
    assert!(!all.contains("Outside"));
    assert!(!all.contains("manual.pdf"));
}

#[tokio::test]
async fn exact_urls_skip_discovery_and_scope() {
    let server = docs_server().await;
    let out = tempfile::tempdir().expect("tempdir");
    let list = out.path().join("pages.txt");
    fs::write(
        &list,
        format!(
            "# pages to export\n{0}/docs/guide\n{0}/other/\n{0}/docs/gone\nmailto:someone\n",
            server.uri()
        ),
    )
    .expect("seed list");

    let summary = run_with_config(config(RunMode::ExactUrls(list), out.path()))
        .await
        .expect("run succeeds");

    assert_eq!(summary.discovered, 3);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.failed, 1);
    let content = summary
        .files
        .iter()
        .map(|f| fs::read_to_string(f).expect("chunk"))
        .collect::<String>();
    assert!(content.contains("Install the tool."));
    assert!(content.contains("Outside"));
    assert!(!content.contains("Start here."));
}

#[tokio::test]
async fn sitemap_lists_titles_and_headings() {
    let server = docs_server().await;
    let out = tempfile::tempdir().expect("tempdir");

    let summary = run_with_config(config(
        RunMode::Sitemap {
            seed: seed(&server, "/docs/"),
            format: SitemapFormat::Text,
        },
        out.path(),
    ))
    .await
    .expect("run succeeds");

    assert_eq!(summary.files.len(), 1);
    let name = summary.files[0].to_string_lossy().to_string();
    assert!(name.contains("_docs_sitemap_"));
    assert!(name.ends_with(".txt"));

    let listing = fs::read_to_string(&summary.files[0]).expect("sitemap");
    assert!(listing.contains("Pages: 4\n"));
    assert!(listing.contains("- Docs home\n"));
    assert!(listing.contains("H1: Documentation\n"));
    assert!(listing.contains("H1: Getting started\n"));
    assert!(listing.contains("Status: ERROR: HTTP 500\n"));
}

#[tokio::test]
async fn unreadable_seed_list_is_fatal() {
    let out = tempfile::tempdir().expect("tempdir");
    let err = run_with_config(config(
        RunMode::MultiSeed(out.path().join("missing.txt")),
        out.path(),
    ))
    .await
    .expect_err("missing list");
    assert!(matches!(err, Error::Seeds(_)));
}
