//! Server-Sent Events client for `/api/events`.

use std::collections::VecDeque;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::BoxStream;
use reqwest::header::ACCEPT;
use taskview_core::EventFrame;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{ClientError, Result};

/// Frames buffered between the stream task and the session.
const FRAME_BUFFER: usize = 32;

/// Incremental decoder for an SSE byte stream.
///
/// Only `data` fields are kept; multi-line data is joined with `\n`. Comment
/// lines (keep-alives) and other fields are skipped.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event payload it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut payloads = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            if line.is_empty() {
                // Blank line dispatches the event
                if !self.data.is_empty() {
                    payloads.push(self.data.join("\n"));
                    self.data.clear();
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            let (field, value) = match line.split_once(':') {
                Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
                None => (line, ""),
            };
            if field == "data" {
                self.data.push(value.to_string());
            }
        }
        payloads
    }
}

/// Open one event stream connection.
pub async fn connect(
    client: &reqwest::Client,
    url: &str,
) -> Result<BoxStream<'static, Result<EventFrame>>> {
    let response = client
        .get(url)
        .header(ACCEPT, "text/event-stream")
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ClientError::Status {
            status: response.status().as_u16(),
        });
    }

    let bytes = Box::pin(response.bytes_stream());
    let state = (bytes, SseDecoder::new(), VecDeque::<String>::new());

    let frames = futures::stream::unfold(
        state,
        |(mut bytes, mut decoder, mut pending)| async move {
            loop {
                if let Some(payload) = pending.pop_front() {
                    let frame = serde_json::from_str::<EventFrame>(&payload).map_err(ClientError::from);
                    return Some((frame, (bytes, decoder, pending)));
                }
                match bytes.next().await {
                    Some(Ok(chunk)) => pending.extend(decoder.push(&chunk)),
                    Some(Err(e)) => return Some((Err(e.into()), (bytes, decoder, pending))),
                    None => return None,
                }
            }
        },
    );
    Ok(frames.boxed())
}

/// Keep an event stream open, reconnecting after `reconnect` whenever it
/// drops. Stops once the returned receiver is dropped.
///
/// Every successful connection starts with a `connected` frame, which is how
/// the receiver learns that it may have missed changes.
pub fn follow(
    client: reqwest::Client,
    url: String,
    reconnect: Duration,
) -> (mpsc::Receiver<EventFrame>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(FRAME_BUFFER);

    let handle = tokio::spawn(async move {
        loop {
            match connect(&client, &url).await {
                Ok(mut stream) => {
                    info!("Connected to {}", url);
                    while let Some(item) = stream.next().await {
                        match item {
                            Ok(frame) => {
                                debug!("Received {:?}", frame);
                                if tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                            Err(ClientError::Frame(e)) => warn!("Skipping malformed frame: {}", e),
                            Err(e) => {
                                warn!("Event stream error: {}", e);
                                break;
                            }
                        }
                    }
                    warn!("Event stream closed, reconnecting in {:?}", reconnect);
                }
                Err(e) => warn!("Failed to connect to {}: {} (retrying in {:?})", url, e, reconnect),
            }

            if tx.is_closed() {
                return;
            }
            tokio::time::sleep(reconnect).await;
        }
    });

    (rx, handle)
}
