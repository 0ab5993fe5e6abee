use std::fmt;

use url::Url;

pub const EXCLUDED_EXTENSIONS: [&str; 12] = [
    ".pdf", ".jpg", ".jpeg", ".png", ".gif", ".zip", ".doc", ".docx", ".xls", ".xlsx", ".mp4",
    ".mp3",
];

pub const EXCLUDED_PATH_SUBSTRINGS: [&str; 5] =
    ["/admin/", "/api/", "/wp-admin/", "/login/", "/logout/"];

/// Absolute `http(s)` URL with the fragment removed. Equality and ordering
/// follow the serialized string, nothing else is canonicalized.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalUrl(Url);

impl CanonicalUrl {
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Self::from_url(Url::parse(trimmed).ok()?)
    }

    fn from_url(mut url: Url) -> Option<Self> {
        if url.scheme() != "http" && url.scheme() != "https" {
            return None;
        }
        url.host_str()?;
        url.set_fragment(None);
        Some(Self(url))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn authority(&self) -> String {
        authority_of(&self.0)
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

fn authority_of(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}

pub fn normalize(raw: &str, base: &CanonicalUrl) -> Option<CanonicalUrl> {
    let href = raw.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("mailto:")
        || href.starts_with("javascript:")
        || href.starts_with("tel:")
    {
        return None;
    }
    let joined = base.as_url().join(href).ok()?;
    CanonicalUrl::from_url(joined)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeSpec {
    domain: String,
    base_path: String,
    excluded_extensions: Vec<String>,
    excluded_path_substrings: Vec<String>,
}

impl ScopeSpec {
    pub fn new(domain: impl Into<String>, base_path: &str) -> Self {
        Self {
            domain: domain.into().to_ascii_lowercase(),
            base_path: coerce_base_path(base_path),
            excluded_extensions: EXCLUDED_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            excluded_path_substrings: EXCLUDED_PATH_SUBSTRINGS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn for_seed(seed: &CanonicalUrl, base_path_override: Option<&str>) -> Self {
        let base_path = match base_path_override {
            Some(explicit) => coerce_base_path(explicit),
            None => derive_base_path(seed.path()),
        };
        Self::new(seed.authority(), &base_path)
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        is_in_scope(url, self)
    }
}

pub fn is_in_scope(url: &CanonicalUrl, spec: &ScopeSpec) -> bool {
    if url.authority() != spec.domain {
        return false;
    }

    let path = url.path();
    if !path.starts_with(&spec.base_path) {
        return false;
    }

    let path_lower = path.to_ascii_lowercase();
    if spec
        .excluded_extensions
        .iter()
        .any(|ext| path_lower.ends_with(ext.as_str()))
    {
        return false;
    }

    !spec
        .excluded_path_substrings
        .iter()
        .any(|excluded| path.contains(excluded.as_str()))
}

/// `/run/docs/fit` -> `/run/docs/`, `/run/docs/` -> `/run/docs/`, `/x` -> `/`.
pub fn derive_base_path(path: &str) -> String {
    if path.ends_with('/') {
        return coerce_base_path(path);
    }
    match path.rfind('/') {
        Some(idx) => coerce_base_path(&path[..=idx]),
        None => "/".to_string(),
    }
}

pub fn coerce_base_path(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out = String::with_capacity(trimmed.len() + 2);
    if !trimmed.starts_with('/') {
        out.push('/');
    }
    out.push_str(trimmed);
    if !out.ends_with('/') {
        out.push('/');
    }
    if out == "//" {
        out.truncate(1);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs_scope() -> ScopeSpec {
        ScopeSpec::new("a.example", "/docs/")
    }

    fn url(raw: &str) -> CanonicalUrl {
        CanonicalUrl::parse(raw).expect("valid url")
    }

    #[test]
    fn scope_accepts_pages_under_base_path() {
        assert!(is_in_scope(&url("https://a.example/docs/x"), &docs_scope()));
        assert!(is_in_scope(&url("https://a.example/docs/"), &docs_scope()));
    }

    #[test]
    fn scope_rejects_other_paths_hosts_and_files() {
        let scope = docs_scope();
        assert!(!is_in_scope(&url("https://a.example/other/x"), &scope));
        assert!(!is_in_scope(&url("https://a.example/docs/x.pdf"), &scope));
        assert!(!is_in_scope(&url("https://a.example/docs/IMAGE.JPEG"), &scope));
        assert!(!is_in_scope(&url("https://other.example/docs/x"), &scope));
        assert!(!is_in_scope(&url("https://sub.a.example/docs/x"), &scope));
        assert!(!is_in_scope(&url("https://a.example/docs/api/v1"), &scope));
        assert!(!is_in_scope(&url("https://a.example/docs/login/"), &scope));
    }

    #[test]
    fn normalize_resolves_relative_and_strips_fragment() {
        let base = url("https://a.example/docs/guide/intro");
        assert_eq!(
            normalize("../ref#top", &base).map(|u| u.to_string()),
            Some("https://a.example/docs/ref".to_string())
        );
        assert_eq!(
            normalize("page?q=1#frag", &base).map(|u| u.to_string()),
            Some("https://a.example/docs/guide/page?q=1".to_string())
        );
        assert_eq!(
            normalize("https://b.example/x", &base).map(|u| u.to_string()),
            Some("https://b.example/x".to_string())
        );
    }

    #[test]
    fn normalize_rejects_non_links() {
        let base = url("https://a.example/docs/");
        assert_eq!(normalize("#section", &base), None);
        assert_eq!(normalize("mailto:me@a.example", &base), None);
        assert_eq!(normalize("javascript:void(0)", &base), None);
        assert_eq!(normalize("ftp://a.example/file", &base), None);
        assert_eq!(normalize("   ", &base), None);
        assert_eq!(normalize("http://[::1", &base), None);
    }

    #[test]
    fn normalization_is_idempotent_for_scope_checks() {
        let base = url("https://a.example/docs/index.html");
        let scope = docs_scope();
        for raw in [
            "x",
            "./y/z#a",
            "/docs/file.PDF",
            "/other/",
            "https://a.example/docs/q?a=b#c",
            "//other.example/docs/",
            "../../admin/",
        ] {
            let Some(once) = normalize(raw, &base) else {
                continue;
            };
            let twice = normalize(once.as_str(), &base).expect("canonical url renormalizes");
            assert_eq!(once, twice, "{raw}");
            assert_eq!(is_in_scope(&once, &scope), is_in_scope(&twice, &scope));
        }
    }

    #[test]
    fn base_path_is_derived_from_seed_directory() {
        assert_eq!(derive_base_path("/run/docs/fit-for-run"), "/run/docs/");
        assert_eq!(derive_base_path("/run/docs/"), "/run/docs/");
        assert_eq!(derive_base_path("/index.html"), "/");
        assert_eq!(derive_base_path("/"), "/");
        assert_eq!(derive_base_path(""), "/");
    }

    #[test]
    fn explicit_base_path_is_coerced() {
        assert_eq!(coerce_base_path("docs"), "/docs/");
        assert_eq!(coerce_base_path("/docs"), "/docs/");
        assert_eq!(coerce_base_path("docs/"), "/docs/");
        assert_eq!(coerce_base_path("/"), "/");
        assert_eq!(coerce_base_path(""), "/");
    }

    #[test]
    fn scope_for_seed_keeps_port_in_domain() {
        let seed = url("http://127.0.0.1:8080/guide/start");
        let scope = ScopeSpec::for_seed(&seed, None);
        assert_eq!(scope.domain(), "127.0.0.1:8080");
        assert_eq!(scope.base_path(), "/guide/");
        assert!(scope.contains(&url("http://127.0.0.1:8080/guide/next")));
        assert!(!scope.contains(&url("http://127.0.0.1:9090/guide/next")));

        let overridden = ScopeSpec::for_seed(&seed, Some("guide/start"));
        assert_eq!(overridden.base_path(), "/guide/start/");
    }
}
