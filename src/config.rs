use std::env;
use std::fmt;
use std::net::SocketAddr;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "tripscout", version, about = "Streaming travel search service")]
pub struct Args {
    /// Address the HTTP server listens on
    #[arg(long, env = "TRIPSCOUT_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Blank or whitespace-only input is treated as absent.
    pub fn new(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    pub fn from_env(var: &str) -> Option<Self> {
        env::var(var).ok().as_deref().and_then(Self::new)
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

pub(crate) fn env_or(var: &str, default: &str) -> String {
    env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelProvider {
    #[default]
    OpenAi,
    DeepSeek,
}

impl ModelProvider {
    /// Unknown selectors fall back to OpenAI.
    pub fn parse(selector: Option<&str>) -> Self {
        match selector.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("deepseek") => ModelProvider::DeepSeek,
            _ => ModelProvider::OpenAi,
        }
    }

    pub fn key_var(self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "OPENAI_API_KEY",
            ModelProvider::DeepSeek => "DEEPSEEK_API_KEY",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelProvider::OpenAi => "OpenAI",
            ModelProvider::DeepSeek => "DeepSeek",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeRange {
    #[default]
    All,
    Day,
    Week,
    Month,
}

impl TimeRange {
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        match raw.map(str::trim) {
            None | Some("") | Some("all") => Some(TimeRange::All),
            Some("1d") => Some(TimeRange::Day),
            Some("7d") => Some(TimeRange::Week),
            Some("30d") => Some(TimeRange::Month),
            Some(_) => None,
        }
    }

    /// Value forwarded to the search provider; `None` means unrestricted.
    pub fn as_filter(self) -> Option<&'static str> {
        match self {
            TimeRange::All => None,
            TimeRange::Day => Some("1d"),
            TimeRange::Week => Some("7d"),
            TimeRange::Month => Some("30d"),
        }
    }
}

pub const ANSWER_TEMPERATURE: f32 = 0.7;
pub const ANSWER_MAX_TOKENS: u32 = 2000;
pub const FOLLOW_UP_TEMPERATURE: f32 = 0.7;
pub const FOLLOW_UP_MAX_TOKENS: u32 = 150;
