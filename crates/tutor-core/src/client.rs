use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::ChatError;
use crate::session::{ChatSession, ExchangeUpdate};
use crate::state::{ChatRequest, Source};
use crate::stream::{parse_record, LineBuffer, Record, StreamEvent};

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ChatError>> + Send>>;

/// Opens the streamed response for a chat request.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError>;
}

/// Full reply from the non-streaming endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub content: String,
    pub sources: Vec<Source>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
}

#[derive(Clone)]
pub struct ChatClient {
    client: Client,
    base_url: String,
}

impl ChatClient {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    /// Share an existing client, e.g. one holding the auth session cookie.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat_sync(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let url = format!("{}/chat/sync", self.base_url);

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status().as_u16()));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| ChatError::Stream(e.to_string()))?;
        Ok(reply)
    }

    pub async fn health(&self) -> Result<HealthStatus, ChatError> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status().as_u16()));
        }

        let status: HealthStatus = response
            .json()
            .await
            .map_err(|e| ChatError::Stream(e.to_string()))?;
        Ok(status)
    }
}

#[async_trait]
impl ChatTransport for ChatClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ByteStream, ChatError> {
        let url = format!("{}/chat", self.base_url);
        debug!(%url, history = request.conversation_history.len(), "opening chat stream");

        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            return Err(ChatError::Status(response.status().as_u16()));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
        Ok(Box::pin(body))
    }
}

/// Run one exchange, handing every update to `sink`.
///
/// The sink returns `false` to stop reading (e.g. its receiver is gone).
/// Reading also stops after an `error` or `done` record. `idle_timeout`
/// bounds the wait for each chunk; `None` waits forever.
pub async fn stream_exchange<T, F>(
    transport: &T,
    request: &ChatRequest,
    idle_timeout: Option<Duration>,
    mut sink: F,
) where
    T: ChatTransport + ?Sized,
    F: FnMut(ExchangeUpdate) -> bool,
{
    let mut stream = match transport.open_stream(request).await {
        Ok(stream) => stream,
        Err(err) => {
            sink(ExchangeUpdate::Failed(err));
            return;
        }
    };

    if !sink(ExchangeUpdate::Started) {
        return;
    }

    let mut lines = LineBuffer::new();

    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, stream.next()).await {
                Ok(item) => item,
                Err(_) => {
                    sink(ExchangeUpdate::Failed(ChatError::Timeout(limit)));
                    return;
                }
            },
            None => stream.next().await,
        };

        match next {
            Some(Ok(bytes)) => {
                for line in lines.push(&bytes) {
                    if dispatch_line(&line, &mut sink).is_break() {
                        return;
                    }
                }
            }
            Some(Err(err)) => {
                sink(ExchangeUpdate::Failed(err));
                return;
            }
            None => break,
        }
    }

    if let Some(line) = lines.finish() {
        if dispatch_line(&line, &mut sink).is_break() {
            return;
        }
    }

    sink(ExchangeUpdate::Finished);
}

fn dispatch_line<F>(line: &str, sink: &mut F) -> ControlFlow<()>
where
    F: FnMut(ExchangeUpdate) -> bool,
{
    match parse_record(line) {
        Record::Ignored | Record::Done => ControlFlow::Continue(()),
        Record::Malformed(err) => {
            warn!(error = %err, line, "skipping malformed stream record");
            ControlFlow::Continue(())
        }
        Record::Event(event) => {
            let terminal = matches!(event, StreamEvent::Error { .. } | StreamEvent::Done);
            if !sink(ExchangeUpdate::Event(event)) || terminal {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    }
}

/// Run the exchange in the background, forwarding updates over a channel.
///
/// Dropping the receiver stops the task at its next chunk.
pub fn spawn_exchange<T>(
    transport: Arc<T>,
    request: ChatRequest,
    idle_timeout: Option<Duration>,
) -> (JoinHandle<()>, mpsc::UnboundedReceiver<ExchangeUpdate>)
where
    T: ChatTransport + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        stream_exchange(transport.as_ref(), &request, idle_timeout, |update| {
            tx.send(update).is_ok()
        })
        .await;
    });
    (handle, rx)
}

/// Run the exchange in place, applying every update to `session`.
pub async fn drive_exchange<T>(
    session: &mut ChatSession,
    transport: &T,
    request: ChatRequest,
    idle_timeout: Option<Duration>,
) where
    T: ChatTransport + ?Sized,
{
    stream_exchange(transport, &request, idle_timeout, |update| {
        session.apply_update(update);
        true
    })
    .await;
}
