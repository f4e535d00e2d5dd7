use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use super::decoder::{StreamDecoder, StreamState};
use super::texture::TextureSink;
use crate::error::{StreamError, StreamErrorKind};

/// Events buffered between the transfer task and the render thread.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One unit of data delivered by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A response header line, `Name: value`
    Header(String),
    /// A body chunk of arbitrary size
    Body(Bytes),
}

/// Source of response headers and body chunks for a stream.
///
/// Implementations must yield every header before the first body chunk and
/// return `Ok(None)` once the transfer is complete.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError>;
}

// =============================================================================
// HTTP Source
// =============================================================================

/// [`ChunkSource`] reading a camera's MJPEG endpoint over HTTP.
pub struct HttpChunkSource {
    client: Client,
    url: Url,
    response: Option<Response>,
    headers: VecDeque<String>,
}

impl HttpChunkSource {
    pub fn new(client: Client, url: Url) -> Self {
        Self {
            client,
            url,
            response: None,
            headers: VecDeque::new(),
        }
    }

    async fn connect(&mut self) -> Result<(), StreamError> {
        debug!(url = %self.url, "Opening MJPEG stream");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| StreamError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StreamError::Status {
                status: status.as_u16(),
                url: self.url.to_string(),
            });
        }

        self.headers
            .push_back(format!("{:?} {}", response.version(), status));
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if name == CONTENT_TYPE {
                self.headers.push_back(format!("Content-Type: {}", value));
            } else {
                self.headers.push_back(format!("{}: {}", name.as_str(), value));
            }
        }

        self.response = Some(response);
        Ok(())
    }
}

#[async_trait]
impl ChunkSource for HttpChunkSource {
    async fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        if self.response.is_none() {
            self.connect().await?;
        }

        if let Some(line) = self.headers.pop_front() {
            return Ok(Some(StreamEvent::Header(line)));
        }

        let Some(response) = self.response.as_mut() else {
            return Ok(None);
        };
        let chunk = response
            .chunk()
            .await
            .map_err(|e| StreamError::Connection(e.to_string()))?;

        Ok(chunk.map(StreamEvent::Body))
    }
}

// =============================================================================
// Polled Stream
// =============================================================================

/// A decoder fed by a background transfer task.
///
/// The task only moves bytes. All parsing, decoding and texture upload run
/// inside [`HttpStream::update`] on the caller's thread, which is expected to
/// be called once per rendered frame.
pub struct HttpStream {
    decoder: StreamDecoder,
    events: mpsc::Receiver<Result<StreamEvent, StreamError>>,
    transfer: JoinHandle<()>,
    transport_error: Option<StreamError>,
}

impl HttpStream {
    /// Open `url` with the given client. Must be called inside a tokio runtime.
    pub fn open(client: Client, url: Url, decoder: StreamDecoder) -> Self {
        Self::spawn(HttpChunkSource::new(client, url), decoder)
    }

    /// Drive `decoder` from any chunk source. Must be called inside a tokio runtime.
    pub fn spawn<S: ChunkSource + 'static>(mut source: S, decoder: StreamDecoder) -> Self {
        let (tx, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let transfer = tokio::spawn(async move {
            loop {
                match source.next_event().await {
                    Ok(Some(event)) => {
                        if tx.send(Ok(event)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                }
            }
        });

        Self {
            decoder,
            events,
            transfer,
            transport_error: None,
        }
    }

    /// Drain available chunks without blocking, then decode into `texture`.
    ///
    /// Returns `true` when a new frame was uploaded.
    pub fn update<T: TextureSink + ?Sized>(&mut self, texture: &mut T) -> bool {
        let mut finished = false;

        loop {
            match self.events.try_recv() {
                Ok(Ok(StreamEvent::Header(line))) => self.decoder.on_header(&line),
                Ok(Ok(StreamEvent::Body(chunk))) => self.decoder.on_body(&chunk),
                Ok(Err(e)) => {
                    warn!(error = %e, "MJPEG transfer failed");
                    self.decoder.set_error(e.kind());
                    self.transport_error = Some(e);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    finished = true;
                    break;
                }
            }
        }

        let uploaded = self.decoder.update(texture);
        if finished {
            self.decoder.terminate();
        }
        uploaded
    }

    pub fn state(&self) -> StreamState {
        self.decoder.state()
    }

    pub fn last_error(&self) -> Option<StreamErrorKind> {
        self.decoder.last_error()
    }

    /// Transport failure that ended the transfer, if any.
    pub fn transport_error(&self) -> Option<&StreamError> {
        self.transport_error.as_ref()
    }

    pub fn decoder(&self) -> &StreamDecoder {
        &self.decoder
    }
}

impl Drop for HttpStream {
    fn drop(&mut self) {
        self.transfer.abort();
    }
}
