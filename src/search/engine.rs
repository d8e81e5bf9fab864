use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::{ApiKey, TimeRange};
use crate::error::{UpstreamError, classify};
use crate::firecrawl::{SearchOptions, SearchProvider};
use crate::llm::{ChatMessage, GenerationRequest, TextGenerator};
use crate::search::context::build_context;
use crate::search::domain::{include_path_globs, retain_allowed};
use crate::search::prompt::{self, parse_follow_up_questions};
use crate::search::select::ContentSelector;
use crate::search::sources::{Source, normalize};
use crate::search::ticker::TickerDetector;
use crate::stream::{Disconnected, EventSink};

const STATUS_STARTING: &str = "Starting search...";
const STATUS_SEARCHING: &str = "Searching for relevant sources...";
const STATUS_ANALYZING: &str = "Analyzing sources and generating answer...";
const STATUS_NO_DOMAIN_MATCH: &str = "⚠️ No results matched the specified domains. Consider relaxing the domain restriction or trying a different query.";

/// A validated request: everything the pipeline needs, resolved up front.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub history: Vec<ChatMessage>,
    /// Normalized allow-list; empty means unrestricted.
    pub domains: Vec<String>,
    pub time_range: TimeRange,
    pub search_key: ApiKey,
}

#[derive(Debug, thiserror::Error)]
enum PipelineError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Disconnected(#[from] Disconnected),
}

enum SearchOutcome {
    Found(Vec<Source>),
    /// The allow-list removed every result the provider returned.
    NoDomainMatch,
}

/// Per-request orchestrator over the external collaborators.
#[derive(Clone)]
pub struct Engine {
    pub search: Arc<dyn SearchProvider>,
    pub answer: Arc<dyn TextGenerator>,
    pub follow_up: Arc<dyn TextGenerator>,
    pub tickers: Arc<dyn TickerDetector>,
    pub selector: Arc<dyn ContentSelector>,
}

impl Engine {
    /// Runs the pipeline until it finishes or the client goes away. Dropping
    /// the pipeline future cancels any in-flight generation.
    pub async fn serve(&self, request: QueryRequest, sink: EventSink) {
        tokio::select! {
            _ = sink.closed() => info!("client disconnected, cancelling generation"),
            _ = self.run(&request, &sink) => {}
        }
    }

    /// Emits every event for one request. Upstream failures end the stream
    /// with a single classified `error` event instead of `complete`.
    pub async fn run(&self, request: &QueryRequest, sink: &EventSink) {
        match self.execute(request, sink).await {
            Ok(()) => info!("request complete"),
            Err(PipelineError::Disconnected(_)) => info!("client disconnected"),
            Err(PipelineError::Upstream(e)) => {
                warn!(error = %e, service = %e.service(), "request failed");
                if sink.error(classify(&e)).await.is_err() {
                    debug!("client gone before error event was delivered");
                }
            }
        }
    }

    async fn execute(&self, request: &QueryRequest, sink: &EventSink) -> Result<(), PipelineError> {
        sink.status(STATUS_STARTING).await?;
        sink.status(STATUS_SEARCHING).await?;

        let sources = match self.find_sources(request).await? {
            SearchOutcome::Found(sources) => sources,
            SearchOutcome::NoDomainMatch => return self.no_domain_match(request, sink).await,
        };

        sink.sources(sources.clone()).await?;
        sink.status(STATUS_ANALYZING).await?;

        let ticker = self.tickers.detect(&request.query);
        info!(ticker = ?ticker, "ticker detection");
        if let Some(symbol) = ticker {
            sink.ticker(symbol).await?;
        }

        let context = build_context(&sources, &request.query, self.selector.as_ref());
        info!(sources = sources.len(), context_len = context.len(), "context built");

        let answer_request = prompt::answer_request(&request.query, &request.history, &context);
        let follow_up_request =
            prompt::follow_up_request(&request.query, &request.history, &sources);

        let answer = self.stream_answer(&answer_request, sink);
        let follow_up = async {
            Ok::<_, PipelineError>(self.follow_up.generate_text(&follow_up_request).await?)
        };
        let (answer, follow_up) = tokio::try_join!(answer, follow_up)?;
        debug!(answer_len = answer.len(), "answer streamed");

        sink.follow_up_questions(parse_follow_up_questions(&follow_up)).await?;
        sink.complete().await?;
        Ok(())
    }

    async fn find_sources(&self, request: &QueryRequest) -> Result<SearchOutcome, UpstreamError> {
        let options = SearchOptions::new(request.time_range, include_path_globs(&request.domains));
        if !request.domains.is_empty() {
            info!(domains = ?request.domains, "restricting search to domains");
        }

        let documents = self
            .search
            .search(&request.search_key, &request.query, &options)
            .await?;
        let returned = documents.len();

        let allowed = retain_allowed(documents, &request.domains);
        if !request.domains.is_empty() {
            info!(returned, kept = allowed.len(), "secondary domain filter applied");
            if allowed.is_empty() && returned > 0 {
                return Ok(SearchOutcome::NoDomainMatch);
            }
        }

        Ok(SearchOutcome::Found(normalize(allowed)))
    }

    async fn no_domain_match(
        &self,
        request: &QueryRequest,
        sink: &EventSink,
    ) -> Result<(), PipelineError> {
        warn!("all results were filtered out by domain restriction");
        sink.status(STATUS_NO_DOMAIN_MATCH).await?;
        sink.sources(Vec::new()).await?;

        let message = prompt::no_matching_domains_message(&request.query, &request.domains);
        for word in message.split(' ') {
            sink.text(format!("{word} ")).await?;
        }
        sink.complete().await?;
        Ok(())
    }

    /// Forwards answer deltas to the sink as they arrive and returns the full text.
    async fn stream_answer(
        &self,
        request: &GenerationRequest,
        sink: &EventSink,
    ) -> Result<String, PipelineError> {
        let mut stream = self.answer.generate_stream(request).await?;
        let mut full = String::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            full.push_str(&chunk);
            sink.text(chunk).await?;
        }
        Ok(full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, Service};
    use crate::firecrawl::RawDocument;
    use crate::llm::TextStream;
    use crate::llm::types::Role;
    use crate::search::select::KeywordSelector;
    use crate::search::ticker::CompanyTickerMap;
    use crate::stream::{DataEvent, StreamEvent};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct MockSearch {
        response: Mutex<Option<Result<Vec<RawDocument>, UpstreamError>>>,
        calls: Mutex<Vec<(String, SearchOptions)>>,
    }

    impl MockSearch {
        fn returning(urls: &[&str]) -> Self {
            let docs = urls
                .iter()
                .enumerate()
                .map(|(i, url)| RawDocument {
                    url: Some(url.to_string()),
                    title: Some(format!("Title {}", i + 1)),
                    markdown: Some(format!("Beaches page {}", i + 1)),
                    ..Default::default()
                })
                .collect();
            Self::with(Ok(docs))
        }

        fn failing(code: u16) -> Self {
            Self::with(Err(UpstreamError::Api {
                service: Service::Search,
                code,
                message: "search failed".into(),
            }))
        }

        fn with(response: Result<Vec<RawDocument>, UpstreamError>) -> Self {
            Self {
                response: Mutex::new(Some(response)),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SearchProvider for MockSearch {
        async fn search(
            &self,
            _key: &ApiKey,
            query: &str,
            options: &SearchOptions,
        ) -> Result<Vec<RawDocument>, UpstreamError> {
            self.calls
                .lock()
                .unwrap()
                .push((query.to_string(), options.clone()));
            self.response.lock().unwrap().take().unwrap_or(Ok(vec![]))
        }
    }

    #[derive(Default)]
    struct MockGenerator {
        chunks: Vec<&'static str>,
        text: &'static str,
        fail_stream_with: Option<u16>,
        /// When set, the first streamed chunk waits until `generate_text` ran.
        gate: Option<Arc<Notify>>,
        stream_calls: AtomicUsize,
        text_calls: AtomicUsize,
        requests: Mutex<Vec<GenerationRequest>>,
    }

    impl MockGenerator {
        fn streaming(chunks: Vec<&'static str>) -> Self {
            Self {
                chunks,
                ..Default::default()
            }
        }

        fn answering(text: &'static str) -> Self {
            Self {
                text,
                ..Default::default()
            }
        }

        fn calls(&self) -> usize {
            self.stream_calls.load(Ordering::SeqCst) + self.text_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TextGenerator for MockGenerator {
        async fn generate_text(
            &self,
            request: &GenerationRequest,
        ) -> Result<String, UpstreamError> {
            self.text_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notify_one();
            }
            Ok(self.text.to_string())
        }

        async fn generate_stream(
            &self,
            request: &GenerationRequest,
        ) -> Result<TextStream, UpstreamError> {
            self.stream_calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            if let Some(code) = self.fail_stream_with {
                return Err(UpstreamError::Api {
                    service: Service::Model,
                    code,
                    message: "model failed".into(),
                });
            }
            let chunks: Vec<Result<String, UpstreamError>> =
                self.chunks.iter().map(|c| Ok(c.to_string())).collect();
            let gate = self.gate.clone();
            let wait = futures::stream::once(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
            })
            .filter_map(|_| futures::future::ready(None::<Result<String, UpstreamError>>));
            Ok(wait.chain(futures::stream::iter(chunks)).boxed())
        }
    }

    struct Harness {
        search: Arc<MockSearch>,
        answer: Arc<MockGenerator>,
        follow_up: Arc<MockGenerator>,
    }

    impl Harness {
        fn new(search: MockSearch, answer: MockGenerator, follow_up: MockGenerator) -> Self {
            Self {
                search: Arc::new(search),
                answer: Arc::new(answer),
                follow_up: Arc::new(follow_up),
            }
        }

        fn engine(&self) -> Engine {
            Engine {
                search: self.search.clone(),
                answer: self.answer.clone(),
                follow_up: self.follow_up.clone(),
                tickers: Arc::new(CompanyTickerMap),
                selector: Arc::new(KeywordSelector),
            }
        }

        async fn run(&self, request: QueryRequest) -> Vec<StreamEvent> {
            let (sink, mut rx) = EventSink::channel(256);
            self.engine().run(&request, &sink).await;
            drop(sink);
            let mut events = Vec::new();
            while let Some(event) = rx.recv().await {
                events.push(event);
            }
            events
        }
    }

    fn request(query: &str, domains: &[&str]) -> QueryRequest {
        QueryRequest {
            query: query.to_string(),
            history: vec![ChatMessage::user(query)],
            domains: domains.iter().map(|d| d.to_string()).collect(),
            time_range: TimeRange::All,
            search_key: ApiKey::new("fc-test").unwrap(),
        }
    }

    fn position(events: &[StreamEvent], pred: impl Fn(&StreamEvent) -> bool) -> usize {
        events.iter().position(pred).expect("event not found")
    }

    fn sources_of(events: &[StreamEvent]) -> Vec<Source> {
        events
            .iter()
            .find_map(|e| match e {
                StreamEvent::Data(DataEvent::Sources { sources }) => Some(sources.clone()),
                _ => None,
            })
            .expect("sources event")
    }

    #[tokio::test]
    async fn happy_path_orders_events() {
        let harness = Harness::new(
            MockSearch::returning(&[
                "https://www.lonelyplanet.com/bali",
                "https://tripadvisor.com/bali",
                "https://shop.lonelyplanet.com/guides",
            ]),
            MockGenerator::streaming(vec!["Kuta ", "beach [1] ", "and more [2]"]),
            MockGenerator::answering("Q1?\n\nQ2?\nQ3?\nQ4?\nQ5?\nQ6?"),
        );

        let events = harness
            .run(request("best beaches in Bali", &["lonelyplanet.com"]))
            .await;

        let sources = sources_of(&events);
        let urls: Vec<_> = sources.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            [
                "https://www.lonelyplanet.com/bali",
                "https://shop.lonelyplanet.com/guides"
            ]
        );

        let sources_at = position(&events, |e| {
            matches!(e, StreamEvent::Data(DataEvent::Sources { .. }))
        });
        let first_text = position(&events, |e| matches!(e, StreamEvent::Text(_)));
        let last_text = events
            .iter()
            .rposition(|e| matches!(e, StreamEvent::Text(_)))
            .unwrap();
        let follow_ups = position(&events, |e| {
            matches!(e, StreamEvent::Data(DataEvent::FollowUpQuestions { .. }))
        });
        assert!(sources_at < first_text);
        assert!(last_text < follow_ups);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Data(DataEvent::Complete))
        );
        assert_eq!(follow_ups, events.len() - 2);

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Kuta beach [1] and more [2]");

        match &events[follow_ups] {
            StreamEvent::Data(DataEvent::FollowUpQuestions { questions }) => {
                assert_eq!(questions, &["Q1?", "Q2?", "Q3?", "Q4?", "Q5?"]);
            }
            other => panic!("unexpected event {other:?}"),
        }

        let (query, options) = harness.search.calls.lock().unwrap()[0].clone();
        assert_eq!(query, "best beaches in Bali");
        assert_eq!(options.limit, 6);
        assert_eq!(options.include_paths.len(), 3);
    }

    #[tokio::test]
    async fn context_cites_filtered_sources_in_order() {
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com/x", "https://b.com/y"]),
            MockGenerator::streaming(vec!["ok"]),
            MockGenerator::answering(""),
        );

        harness.run(request("beaches", &[])).await;

        let requests = harness.answer.requests.lock().unwrap();
        let user = &requests[0].messages.last().unwrap().content;
        let first = user.find("[1] Title 1\nURL: https://a.com/x\nBeaches page 1").unwrap();
        let second = user.find("[2] Title 2\nURL: https://b.com/y\nBeaches page 2").unwrap();
        assert!(first < second);
        assert!(!user.contains("[3]"));
    }

    #[tokio::test]
    async fn no_domain_match_short_circuits_without_model_calls() {
        let harness = Harness::new(
            MockSearch::returning(&["https://unrelated.com/a", "https://other.org/b"]),
            MockGenerator::streaming(vec!["never"]),
            MockGenerator::answering("never"),
        );

        let events = harness
            .run(request(
                "best beaches in Bali",
                &["example-nonexistent-travel-site.xyz"],
            ))
            .await;

        assert_eq!(harness.answer.calls(), 0);
        assert_eq!(harness.follow_up.calls(), 0);
        assert!(sources_of(&events).is_empty());
        assert!(events.iter().any(|e| matches!(
            e,
            StreamEvent::Data(DataEvent::Status { message }) if message.starts_with("⚠️")
        )));

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert!(text.contains("example-nonexistent-travel-site.xyz"));
        assert!(text.contains("\"best beaches in Bali\""));
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::Data(DataEvent::FollowUpQuestions { .. })
        )));
    }

    #[tokio::test]
    async fn empty_search_result_with_domains_still_generates() {
        let harness = Harness::new(
            MockSearch::returning(&[]),
            MockGenerator::streaming(vec!["Nothing found."]),
            MockGenerator::answering("Q?"),
        );

        let events = harness.run(request("bali", &["lonelyplanet.com"])).await;

        assert!(sources_of(&events).is_empty());
        assert_eq!(harness.answer.calls(), 1);
        assert_eq!(events.last(), Some(&StreamEvent::Data(DataEvent::Complete)));
    }

    #[tokio::test]
    async fn search_429_emits_rate_limited_error_without_complete() {
        let harness = Harness::new(
            MockSearch::failing(429),
            MockGenerator::streaming(vec![]),
            MockGenerator::answering(""),
        );

        let events = harness.run(request("bali", &[])).await;

        match events.last() {
            Some(StreamEvent::Data(DataEvent::Error(err))) => {
                assert_eq!(err.kind, ErrorKind::RateLimited);
                assert_eq!(
                    err.suggestion.as_deref(),
                    Some("Too many requests. Please wait a moment and try again.")
                );
                assert_eq!(err.status_code, Some(429));
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(!events.contains(&StreamEvent::Data(DataEvent::Complete)));
        assert_eq!(harness.answer.calls(), 0);
    }

    #[tokio::test]
    async fn model_failure_emits_classified_error() {
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com"]),
            MockGenerator {
                fail_stream_with: Some(500),
                ..Default::default()
            },
            MockGenerator::answering("Q?"),
        );

        let events = harness.run(request("bali", &[])).await;

        match events.last() {
            Some(StreamEvent::Data(DataEvent::Error(err))) => {
                assert_eq!(err.kind, ErrorKind::Generic);
                assert!(err.message.contains("model failed"));
                assert_eq!(err.status_code, Some(500));
            }
            other => panic!("expected error event, got {other:?}"),
        }
        assert!(!events.iter().any(|e| matches!(
            e,
            StreamEvent::Data(DataEvent::FollowUpQuestions { .. })
        )));
    }

    #[tokio::test]
    async fn answer_and_follow_up_run_concurrently() {
        let gate = Arc::new(Notify::new());
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com"]),
            MockGenerator {
                chunks: vec!["answer"],
                gate: Some(gate.clone()),
                ..Default::default()
            },
            MockGenerator {
                text: "Q?",
                gate: Some(gate),
                ..Default::default()
            },
        );

        let events = tokio::time::timeout(Duration::from_secs(5), harness.run(request("bali", &[])))
            .await
            .expect("answer stream waited on follow-up generation that never started");

        assert_eq!(events.last(), Some(&StreamEvent::Data(DataEvent::Complete)));
    }

    #[tokio::test]
    async fn ticker_event_precedes_answer_text() {
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com"]),
            MockGenerator::streaming(vec!["Airbnb tips"]),
            MockGenerator::answering(""),
        );

        let events = harness.run(request("Airbnb stays in Lisbon", &[])).await;

        let ticker = position(&events, |e| {
            matches!(e, StreamEvent::Data(DataEvent::Ticker { symbol }) if symbol == "ABNB")
        });
        let first_text = position(&events, |e| matches!(e, StreamEvent::Text(_)));
        assert!(ticker < first_text);
    }

    #[tokio::test]
    async fn follow_up_request_uses_conversation_history() {
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com"]),
            MockGenerator::streaming(vec!["ok"]),
            MockGenerator::answering("Q?"),
        );
        let mut req = request("and for surfing?", &[]);
        req.history = vec![
            ChatMessage::user("best beaches in Bali"),
            ChatMessage {
                role: Role::Assistant,
                content: "Kuta [1]".into(),
            },
            ChatMessage::user("and for surfing?"),
        ];

        harness.run(req).await;

        let answer_requests = harness.answer.requests.lock().unwrap();
        assert_eq!(answer_requests[0].messages.len(), 4);
        assert_eq!(harness.search.calls.lock().unwrap().len(), 1);

        let follow_requests = harness.follow_up.requests.lock().unwrap();
        assert!(follow_requests[0].messages[1]
            .content
            .contains("assistant: Kuta [1]"));
    }

    #[tokio::test]
    async fn serve_stops_when_client_disconnects() {
        let harness = Harness::new(
            MockSearch::returning(&["https://a.com"]),
            MockGenerator {
                chunks: vec!["never delivered"],
                gate: Some(Arc::new(Notify::new())),
                ..Default::default()
            },
            MockGenerator::answering("Q?"),
        );
        let (sink, mut rx) = EventSink::channel(256);
        let engine = harness.engine();
        let task = tokio::spawn(async move { engine.serve(request("bali", &[]), sink).await });

        // Wait until the pipeline reached the analyzing stage, then hang up.
        while let Some(event) = rx.recv().await {
            if let StreamEvent::Data(DataEvent::Status { message }) = &event
                && message == STATUS_ANALYZING
            {
                break;
            }
        }
        drop(rx);

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("pipeline kept running after disconnect")
            .unwrap();
    }
}
