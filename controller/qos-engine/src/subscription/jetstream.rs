//! NATS JetStream report source

use super::{decode_event, ReportSource, ReportStream, ReportStreamKind};
use anyhow::{anyhow, Context, Result};
use async_nats::jetstream::{
    self,
    consumer::{AckPolicy, DeliverPolicy, PullConsumer},
    stream::Stream,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Connection settings shared by both report subjects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JetStreamSettings {
    pub nats_url: String,
    pub creds_path: Option<String>,
    pub stream_name: String,
    /// Durable consumer prefix; each subject gets `<prefix>-<stream>`
    pub consumer_name: String,
}

impl JetStreamSettings {
    pub fn consumer_for(&self, kind: ReportStreamKind) -> String {
        format!("{}-{}", self.consumer_name, kind.as_str())
    }
}

/// Pulls operation reports for one subject from a durable consumer.
/// Messages are acked once decoded, so each report is evaluated once.
pub struct JetStreamReportSource {
    kind: ReportStreamKind,
    settings: JetStreamSettings,
}

impl JetStreamReportSource {
    pub fn new(kind: ReportStreamKind, settings: JetStreamSettings) -> Self {
        Self { kind, settings }
    }

    async fn connect_nats(&self) -> Result<async_nats::Client> {
        info!(url = %self.settings.nats_url, stream = %self.kind, "Connecting to NATS");

        let client = if let Some(creds_path) = &self.settings.creds_path {
            async_nats::ConnectOptions::new()
                .credentials_file(creds_path)
                .await
                .context("Failed to load NATS credentials")?
                .connect(&self.settings.nats_url)
                .await
                .context("Failed to connect to NATS with credentials")?
        } else {
            async_nats::connect(&self.settings.nats_url)
                .await
                .context("Failed to connect to NATS")?
        };

        Ok(client)
    }

    async fn ensure_stream(&self, jetstream: &jetstream::Context) -> Result<Stream> {
        let stream_config = jetstream::stream::Config {
            name: self.settings.stream_name.clone(),
            subjects: ReportStreamKind::ALL
                .iter()
                .map(|kind| kind.subject().to_string())
                .collect(),
            max_age: Duration::from_secs(3600 * 24),
            ..Default::default()
        };

        jetstream
            .get_or_create_stream(stream_config)
            .await
            .context("Failed to get or create JetStream stream")
    }

    async fn create_consumer(&self, stream: &Stream) -> Result<PullConsumer> {
        let consumer_name = self.settings.consumer_for(self.kind);
        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(consumer_name.clone()),
            filter_subject: self.kind.subject().to_string(),
            deliver_policy: DeliverPolicy::New,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(30),
            ..Default::default()
        };

        stream
            .get_or_create_consumer(&consumer_name, consumer_config)
            .await
            .context("Failed to create consumer")
    }
}

#[async_trait]
impl ReportSource for JetStreamReportSource {
    fn kind(&self) -> ReportStreamKind {
        self.kind
    }

    async fn subscribe(&self) -> Result<ReportStream> {
        let client = self.connect_nats().await?;
        let jetstream = jetstream::new(client);
        let stream = self.ensure_stream(&jetstream).await?;
        let consumer = self.create_consumer(&stream).await?;

        let messages = consumer
            .messages()
            .await
            .context("Failed to open consumer message stream")?;

        info!(
            subject = %self.kind.subject(),
            consumer = %self.settings.consumer_for(self.kind),
            "JetStream consumer ready"
        );

        let events = messages.then(|item| async move {
            let msg = item.map_err(|e| anyhow!("Error receiving message: {}", e))?;
            debug!(subject = %msg.subject, payload_size = msg.payload.len(), "Received report message");
            let event = decode_event(&msg.payload);
            if let Err(e) = msg.ack().await {
                warn!(subject = %msg.subject, error = %e, "Failed to ack report message");
            }
            Ok::<_, anyhow::Error>(event)
        });

        Ok(Box::pin(events))
    }
}
