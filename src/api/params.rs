use serde::Deserialize;

use crate::llm::ChatMessage;

/// Body of `POST /api/search`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchBody {
    /// Conversation so far; the last entry is the newest user turn
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Used when `messages` is empty or its last entry is blank
    pub query: Option<String>,
    /// Bare domains to restrict results to (e.g. "lonelyplanet.com")
    #[serde(default)]
    pub search_domains: Vec<String>,
    /// "all" (default), "1d", "7d" or "30d"
    pub time_range: Option<String>,
    /// "openai" (default) or "deepseek"
    pub model_provider: Option<String>,
    /// Caller-supplied Firecrawl key, takes precedence over the server's
    pub firecrawl_api_key: Option<String>,
}

impl SearchBody {
    pub fn resolved_query(&self) -> Option<String> {
        self.messages
            .last()
            .map(|m| m.content.trim())
            .filter(|q| !q.is_empty())
            .or_else(|| self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()))
            .map(String::from)
    }
}
