use serde::Serialize;

use crate::firecrawl::RawDocument;

/// A search hit in the shape shown to clients and fed to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
}

impl Source {
    /// Page body used for context: markdown first, then plain content.
    pub fn body(&self) -> &str {
        self.markdown
            .as_deref()
            .or(self.content.as_deref())
            .unwrap_or_default()
    }
}

/// Order-preserving conversion of provider documents. Documents without a URL
/// are dropped.
pub fn normalize(documents: Vec<RawDocument>) -> Vec<Source> {
    documents.into_iter().filter_map(normalize_one).collect()
}

fn normalize_one(doc: RawDocument) -> Option<Source> {
    let url = present(doc.url)?;
    let meta = doc.metadata.unwrap_or_default();

    Some(Source {
        title: present(doc.title).unwrap_or_else(|| url.clone()),
        description: present(doc.description).or_else(|| present(meta.description)),
        content: present(doc.content),
        markdown: present(doc.markdown),
        published_date: present(doc.published_date),
        author: present(doc.author),
        image: present(doc.image)
            .or_else(|| present(meta.og_image))
            .or_else(|| present(meta.image)),
        favicon: present(meta.favicon),
        site_name: present(meta.site_name),
        url,
    })
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
