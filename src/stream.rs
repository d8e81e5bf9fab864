//! Event protocol and the single ordered output channel.
//!
//! Frames use the v1 data-stream framing: answer text as `0:<json string>\n`,
//! typed events as `2:[<json object>]\n`.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::error;

use crate::error::ClassifiedError;
use crate::search::sources::Source;

pub const FRAMING_HEADER: &str = "x-vercel-ai-data-stream";
pub const FRAMING_VERSION: &str = "v1";

/// Typed events. Answer text travels separately as `StreamEvent::Text`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataEvent {
    Status { message: String },
    Sources { sources: Vec<Source> },
    Ticker { symbol: String },
    FollowUpQuestions { questions: Vec<String> },
    Error(ClassifiedError),
    Complete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Text(String),
    Data(DataEvent),
}

impl StreamEvent {
    pub fn encode(&self) -> String {
        let encoded = match self {
            StreamEvent::Text(text) => serde_json::to_string(text).map(|s| format!("0:{s}\n")),
            StreamEvent::Data(data) => serde_json::to_string(data).map(|s| format!("2:[{s}]\n")),
        };
        encoded.unwrap_or_else(|e| {
            error!(error = %e, "failed to encode stream event");
            String::new()
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("client disconnected")]
pub struct Disconnected;

/// Write side of a request's output channel. Events are delivered in the
/// order they are sent.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::Sender<StreamEvent>,
}

impl EventSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<StreamEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn send(&self, event: StreamEvent) -> Result<(), Disconnected> {
        self.tx.send(event).await.map_err(|_| Disconnected)
    }

    async fn data(&self, event: DataEvent) -> Result<(), Disconnected> {
        self.send(StreamEvent::Data(event)).await
    }

    pub async fn text(&self, chunk: impl Into<String>) -> Result<(), Disconnected> {
        self.send(StreamEvent::Text(chunk.into())).await
    }

    pub async fn status(&self, message: impl Into<String>) -> Result<(), Disconnected> {
        self.data(DataEvent::Status {
            message: message.into(),
        })
        .await
    }

    pub async fn sources(&self, sources: Vec<Source>) -> Result<(), Disconnected> {
        self.data(DataEvent::Sources { sources }).await
    }

    pub async fn ticker(&self, symbol: String) -> Result<(), Disconnected> {
        self.data(DataEvent::Ticker { symbol }).await
    }

    pub async fn follow_up_questions(&self, questions: Vec<String>) -> Result<(), Disconnected> {
        self.data(DataEvent::FollowUpQuestions { questions }).await
    }

    pub async fn error(&self, error: ClassifiedError) -> Result<(), Disconnected> {
        self.data(DataEvent::Error(error)).await
    }

    pub async fn complete(&self) -> Result<(), Disconnected> {
        self.data(DataEvent::Complete).await
    }

    /// Resolves once the reading side is gone.
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}
