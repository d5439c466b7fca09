//! Server-sent events report source

use super::{decode_event, ReportSource, ReportStream, ReportStreamKind};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::debug;

const TCP_KEEPALIVE: Duration = Duration::from_secs(60);

/// Incremental `text/event-stream` parser.
///
/// Chunks may split lines (and UTF-8 sequences) anywhere; an event is
/// complete at the first blank line and its `data:` lines are joined with
/// `\n`. Comments and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning the data of every event it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');

            if line.is_empty() {
                if !self.data.is_empty() {
                    events.push(self.data.join("\n"));
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
        events
    }
}

/// Subscribes to one event manager stream over HTTP
pub struct SseReportSource {
    kind: ReportStreamKind,
    url: String,
    connect_timeout: Duration,
    client: reqwest::Client,
}

impl SseReportSource {
    /// `connect_timeout` bounds opening the stream. An open stream has no
    /// overall deadline; dead peers are caught by TCP keepalive and by the
    /// listener's idle timeout.
    pub fn new(kind: ReportStreamKind, event_manager_url: &str, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()
            .context("Failed to build event stream HTTP client")?;

        Ok(Self {
            kind,
            url: format!("{}{}", event_manager_url.trim_end_matches('/'), kind.sse_path()),
            connect_timeout,
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ReportSource for SseReportSource {
    fn kind(&self) -> ReportStreamKind {
        self.kind
    }

    async fn subscribe(&self) -> Result<ReportStream> {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send();
        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .with_context(|| format!("Timed out connecting to event stream {}", self.url))?
            .with_context(|| format!("Failed to connect to event stream {}", self.url))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            bail!("Event stream {} returned {}: {}", self.url, status, error_text);
        }

        debug!(url = %self.url, "Event stream open");

        let events = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            let mut body = response.bytes_stream();
            while let Some(chunk) = body.next().await {
                match chunk {
                    Ok(chunk) => {
                        for data in decoder.push(&chunk) {
                            yield Ok(decode_event(data.as_bytes()));
                        }
                    }
                    Err(e) => {
                        yield Err(anyhow::Error::new(e).context("Failed to read event stream chunk"));
                        break;
                    }
                }
            }
        };

        Ok(Box::pin(events))
    }
}
