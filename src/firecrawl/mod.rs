//! Firecrawl search collaborator: wire types and HTTP client.

pub mod client;
pub mod types;

pub use client::{FirecrawlClient, SearchProvider};
pub use types::{RawDocument, SearchOptions};
