use serde::{Deserialize, Serialize};

use crate::config::TimeRange;

pub const RESULT_LIMIT: usize = 6;
pub const CONTENT_FORMAT: &str = "markdown";

/// Per-request search configuration. Built once from the incoming request and
/// handed to the provider unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub limit: usize,
    pub formats: Vec<&'static str>,
    pub main_content_only: bool,
    pub time_range: Option<&'static str>,
    pub include_paths: Vec<String>,
}

impl SearchOptions {
    pub fn new(time_range: TimeRange, include_paths: Vec<String>) -> Self {
        Self {
            limit: RESULT_LIMIT,
            formats: vec![CONTENT_FORMAT],
            main_content_only: true,
            time_range: time_range.as_filter(),
            include_paths,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    pub limit: usize,
    pub page_options: PageOptions<'a>,
    pub scrape_options: ScrapeOptions<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageOptions<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_published: Option<&'a str>,
    #[serde(skip_serializing_if = "no_paths")]
    pub include_paths: &'a [String],
}

fn no_paths(paths: &&[String]) -> bool {
    paths.is_empty()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeOptions<'a> {
    pub formats: &'a [&'static str],
    pub only_main_content: bool,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str, options: &'a SearchOptions) -> Self {
        Self {
            query,
            limit: options.limit,
            page_options: PageOptions {
                time_published: options.time_range,
                include_paths: &options.include_paths,
            },
            scrape_options: ScrapeOptions {
                formats: &options.formats,
                only_main_content: options.main_content_only,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SearchResponse {
    pub success: Option<bool>,
    pub data: Option<Vec<RawDocument>>,
    pub error: Option<String>,
}

/// A search hit as returned by the provider. Every field is optional; the
/// normalizer decides what survives.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawDocument {
    pub url: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
    pub markdown: Option<String>,
    pub published_date: Option<String>,
    pub author: Option<String>,
    pub image: Option<String>,
    pub metadata: Option<DocumentMetadata>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub description: Option<String>,
    pub og_image: Option<String>,
    pub image: Option<String>,
    pub favicon: Option<String>,
    pub site_name: Option<String>,
}
