//! Domain allow-list: search-time glob hints and the authoritative host filter
//! applied to returned documents.

use url::Url;

use crate::firecrawl::RawDocument;

/// Cleans user-entered domains: lower-cases, strips scheme, a leading `www.`
/// and trailing slashes, drops blanks and duplicates (first occurrence wins).
pub fn normalize_domains(raw: &[String]) -> Vec<String> {
    let mut domains: Vec<String> = Vec::with_capacity(raw.len());
    for entry in raw {
        let lower = entry.trim().to_ascii_lowercase();
        let without_scheme = lower
            .strip_prefix("https://")
            .or_else(|| lower.strip_prefix("http://"))
            .unwrap_or(&lower);
        let bare = without_scheme
            .strip_prefix("www.")
            .unwrap_or(without_scheme)
            .trim_end_matches('/');
        if !bare.is_empty() && !domains.iter().any(|d| d == bare) {
            domains.push(bare.to_string());
        }
    }
    domains
}

/// Inclusion globs passed to the search provider. The provider treats these
/// as hints only; `retain_allowed` enforces the allow-list.
pub fn include_path_globs(domains: &[String]) -> Vec<String> {
    domains
        .iter()
        .flat_map(|d| {
            [
                format!("*://{d}/**"),
                format!("*://*.{d}/**"),
                format!("*://www.{d}/**"),
            ]
        })
        .collect()
}

/// True when `host` is `domain`, `www.<domain>`, or any subdomain of it.
pub fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Keeps documents whose URL host falls inside the allow-list. Documents with
/// a missing or unparseable URL are dropped. An empty allow-list keeps all.
pub fn retain_allowed(documents: Vec<RawDocument>, domains: &[String]) -> Vec<RawDocument> {
    if domains.is_empty() {
        return documents;
    }
    documents
        .into_iter()
        .filter(|doc| {
            let Some(host) = doc
                .url
                .as_deref()
                .and_then(|u| Url::parse(u).ok())
                .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
            else {
                return false;
            };
            domains.iter().any(|d| host_matches(&host, d))
        })
        .collect()
}
