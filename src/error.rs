//! Typed upstream failures and their mapping onto user-facing error categories.

use std::fmt;

use serde::Serialize;

/// Which external collaborator a failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Search,
    Model,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Search => f.write_str("search provider"),
            Service::Model => f.write_str("model backend"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} API error ({code}): {message}")]
    Api {
        service: Service,
        code: u16,
        message: String,
    },

    #[error("{service} network error: {source}")]
    Network {
        service: Service,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned an unexpected response: {message}")]
    Protocol { service: Service, message: String },
}

impl UpstreamError {
    pub fn network(service: Service) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| UpstreamError::Network { service, source }
    }

    pub fn protocol(service: Service, message: impl Into<String>) -> Self {
        UpstreamError::Protocol {
            service,
            message: message.into(),
        }
    }

    pub fn service(&self) -> Service {
        match self {
            UpstreamError::Api { service, .. }
            | UpstreamError::Network { service, .. }
            | UpstreamError::Protocol { service, .. } => *service,
        }
    }

    /// HTTP status reported by the upstream, when one is known.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            UpstreamError::Api { code, .. } => Some(*code),
            UpstreamError::Network { source, .. } => source.status().map(|s| s.as_u16()),
            UpstreamError::Protocol { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidCredential,
    QuotaExhausted,
    RateLimited,
    UpstreamTimeout,
    Generic,
}

/// Payload of the terminal `error` stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
}

/// Maps an upstream failure to the category shown to the client. Total: codes
/// without a dedicated category keep the upstream message.
pub fn classify(err: &UpstreamError) -> ClassifiedError {
    let status_code = err.status_code();
    let (kind, message, suggestion) = match status_code {
        Some(401) => (
            ErrorKind::InvalidCredential,
            "Invalid API key",
            "Please check your Firecrawl API key is correct.",
        ),
        Some(402) => (
            ErrorKind::QuotaExhausted,
            "Insufficient credits",
            "You've run out of Firecrawl credits. Please upgrade your plan.",
        ),
        Some(429) => (
            ErrorKind::RateLimited,
            "Rate limit exceeded",
            "Too many requests. Please wait a moment and try again.",
        ),
        Some(504) => (
            ErrorKind::UpstreamTimeout,
            "Request timeout",
            "The search took too long. Try a simpler query or fewer sources.",
        ),
        _ => {
            return ClassifiedError {
                kind: ErrorKind::Generic,
                message: err.to_string(),
                suggestion: None,
                status_code,
            };
        }
    };

    ClassifiedError {
        kind,
        message: message.to_string(),
        suggestion: Some(suggestion.to_string()),
        status_code,
    }
}
