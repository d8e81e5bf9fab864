mod errors;
mod params;

pub use errors::ApiError;
pub use params::SearchBody;

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::StreamExt;
use reqwest::Client;
use serde::Serialize;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Instrument, info, info_span};

use crate::config::{ApiKey, ModelProvider, TimeRange};
use crate::firecrawl::{FirecrawlClient, SearchProvider};
use crate::llm::{ChatClient, FOLLOW_UP_MODEL, TextGenerator};
use crate::search::domain::normalize_domains;
use crate::search::engine::{Engine, QueryRequest};
use crate::search::select::{ContentSelector, KeywordSelector};
use crate::search::ticker::{CompanyTickerMap, TickerDetector};
use crate::stream::{EventSink, FRAMING_HEADER, FRAMING_VERSION};

/// Events buffered between the pipeline and a slow client.
const EVENT_BUFFER: usize = 64;

/// Shared collaborators, built once at startup.
///
/// Configuration via environment variables:
/// - `FIRECRAWL_API_KEY`: default search key (callers may send their own)
/// - `OPENAI_API_KEY`: OpenAI answers and follow-up questions
/// - `DEEPSEEK_API_KEY`: DeepSeek answers (optional)
#[derive(Clone)]
pub struct AppState {
    pub search: Arc<dyn SearchProvider>,
    pub search_key: Option<ApiKey>,
    pub openai: Option<Arc<dyn TextGenerator>>,
    pub deepseek: Option<Arc<dyn TextGenerator>>,
    pub follow_up: Option<Arc<dyn TextGenerator>>,
    pub tickers: Arc<dyn TickerDetector>,
    pub selector: Arc<dyn ContentSelector>,
}

impl AppState {
    pub fn from_env(http: Client) -> Self {
        let openai = ChatClient::from_env(http.clone(), ModelProvider::OpenAi);
        let follow_up = openai
            .clone()
            .map(|c| Arc::new(c.with_model(FOLLOW_UP_MODEL)) as Arc<dyn TextGenerator>);
        let deepseek = ChatClient::from_env(http.clone(), ModelProvider::DeepSeek);

        Self {
            search: Arc::new(FirecrawlClient::from_env(http)),
            search_key: ApiKey::from_env("FIRECRAWL_API_KEY"),
            openai: openai.map(|c| Arc::new(c) as Arc<dyn TextGenerator>),
            deepseek: deepseek.map(|c| Arc::new(c) as Arc<dyn TextGenerator>),
            follow_up,
            tickers: Arc::new(CompanyTickerMap),
            selector: Arc::new(KeywordSelector),
        }
    }

    fn backend(&self, provider: ModelProvider) -> Option<Arc<dyn TextGenerator>> {
        match provider {
            ModelProvider::OpenAi => self.openai.clone(),
            ModelProvider::DeepSeek => self.deepseek.clone(),
        }
    }

    /// Validates the body and resolves credentials and backends. Nothing has
    /// been written to the client yet, so failures become plain JSON errors.
    fn prepare(&self, body: SearchBody) -> Result<(QueryRequest, Engine), ApiError> {
        let query = body.resolved_query().ok_or(ApiError::MissingQuery)?;
        let time_range = TimeRange::parse(body.time_range.as_deref()).ok_or_else(|| {
            ApiError::InvalidTimeRange(body.time_range.clone().unwrap_or_default())
        })?;

        let search_key = body
            .firecrawl_api_key
            .as_deref()
            .and_then(ApiKey::new)
            .or_else(|| self.search_key.clone())
            .ok_or(ApiError::MissingSearchKey)?;

        let provider = ModelProvider::parse(body.model_provider.as_deref());
        let answer = self
            .backend(provider)
            .ok_or(ApiError::MissingModelKey(provider))?;
        let follow_up = self.follow_up.clone().unwrap_or_else(|| answer.clone());
        info!(provider = provider.display_name(), "model backend selected");

        let request = QueryRequest {
            query,
            history: body.messages,
            domains: normalize_domains(&body.search_domains),
            time_range,
            search_key,
        };
        let engine = Engine {
            search: self.search.clone(),
            answer,
            follow_up,
            tickers: self.tickers.clone(),
            selector: self.selector.clone(),
        };
        Ok((request, engine))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/search", post(search))
        .route("/api/check-env", get(check_env))
        .with_state(state)
}

async fn search(
    State(state): State<AppState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(body) = body?;
    let request_id = format!("{:08x}", fastrand::u32(..));
    let span = info_span!("search", %request_id);

    let (request, engine) = span.in_scope(|| state.prepare(body))?;
    span.in_scope(|| {
        info!(
            query = %request.query,
            turns = request.history.len(),
            time_range = ?request.time_range,
            "query received"
        )
    });

    let (sink, rx) = EventSink::channel(EVENT_BUFFER);
    tokio::spawn(async move { engine.serve(request, sink).await }.instrument(span));

    let frames = ReceiverStream::new(rx).map(|event| Ok::<_, Infallible>(event.encode()));
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        ),
        (
            HeaderName::from_static(FRAMING_HEADER),
            HeaderValue::from_static(FRAMING_VERSION),
        ),
    ];
    Ok((headers, Body::from_stream(frames)).into_response())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvStatus {
    has_firecrawl_key: bool,
    has_openai_key: bool,
    has_deepseek_key: bool,
}

async fn check_env(State(state): State<AppState>) -> Json<EnvStatus> {
    Json(EnvStatus {
        has_firecrawl_key: state.search_key.is_some(),
        has_openai_key: state.openai.is_some(),
        has_deepseek_key: state.deepseek.is_some(),
    })
}
