//! Configuration for the QoS engine service

use crate::enforcement::EnforcementConfig;
use crate::model::AlgorithmKind;
use crate::prediction::PredictionConfig;
use crate::subscription::{Backoff, JetStreamSettings, ReportStreamKind};
use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;

/// How operation reports reach the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EventTransport {
    /// Server-sent events from the event manager
    Sse,
    /// NATS JetStream subjects
    Jetstream,
}

/// Configuration for the QoS engine
#[derive(Debug, Clone, Parser)]
#[command(name = "qos-engine")]
#[command(about = "Checks service QoS and enforces agent counts from operation reports")]
pub struct Config {
    /// Base URL of the CIMI resource store
    #[arg(long, env, default_value = "https://cimi:8201/api")]
    pub cimi_url: String,

    /// Prediction algorithm used by QoS checks
    #[arg(long, env, value_enum, default_value_t = AlgorithmKind::Heuristic)]
    pub algorithm: AlgorithmKind,

    /// Services at or above this agent count are never scaled
    #[arg(long, env, default_value_t = 8)]
    pub max_agents_enforcement: u32,

    /// Factor applied to the agent count when scaling
    #[arg(long, env, default_value_t = 2)]
    pub mul_factor_enforcement: u32,

    /// Transport for operation report events
    #[arg(long, env, value_enum, default_value_t = EventTransport::Sse)]
    pub event_transport: EventTransport,

    /// Event manager base URL (SSE transport)
    #[arg(long, env, default_value = "http://event-manager:8000")]
    pub event_manager_url: String,

    /// NATS server URL (JetStream transport)
    #[arg(long, env, default_value = "nats://localhost:4222")]
    pub nats_url: String,

    /// Path to NATS credentials file
    #[arg(long, env)]
    pub nats_creds_path: Option<String>,

    /// JetStream stream name
    #[arg(long, env, default_value = "SERVICE_OPERATION_REPORTS")]
    pub stream_name: String,

    /// Durable consumer name prefix
    #[arg(long, env, default_value = "qos-engine")]
    pub consumer_name: String,

    /// Lifecycle manager endpoint that receives agent requests
    #[arg(long, env)]
    pub lifecycle_manager_url: Option<String>,

    /// Dry-run mode (log scale-up requests instead of sending them)
    #[arg(long, env)]
    pub dry_run: bool,

    /// Timeout for every outbound HTTP call, in seconds
    #[arg(long, env, default_value_t = 10)]
    pub request_timeout_secs: u64,

    /// Initial reconnect delay for report streams, in milliseconds
    #[arg(long, env, default_value_t = 10_000)]
    pub reconnect_backoff_ms: u64,

    /// Reconnect delay cap, in milliseconds
    #[arg(long, env, default_value_t = 60_000)]
    pub max_reconnect_backoff_ms: u64,

    /// Reconnect a report stream that delivers nothing for this long, in seconds (0 disables)
    #[arg(long, env, default_value_t = 300)]
    pub stream_idle_timeout_secs: u64,

    /// Heuristic: minimum healthy ratio for an agent to stay allowed
    #[arg(long, env, default_value_t = 0.8)]
    pub acceptance_ratio: f64,

    /// Learned: step size of the value update
    #[arg(long, env, default_value_t = 0.1)]
    pub learning_rate: f64,

    /// Learned: discount applied to the best estimate
    #[arg(long, env, default_value_t = 0.99)]
    pub discount_factor: f64,

    /// Output logs in JSON format
    #[arg(long, env)]
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cimi_url: "https://cimi:8201/api".to_string(),
            algorithm: AlgorithmKind::Heuristic,
            max_agents_enforcement: 8,
            mul_factor_enforcement: 2,
            event_transport: EventTransport::Sse,
            event_manager_url: "http://event-manager:8000".to_string(),
            nats_url: "nats://localhost:4222".to_string(),
            nats_creds_path: None,
            stream_name: "SERVICE_OPERATION_REPORTS".to_string(),
            consumer_name: "qos-engine".to_string(),
            lifecycle_manager_url: None,
            dry_run: false,
            request_timeout_secs: 10,
            reconnect_backoff_ms: 10_000,
            max_reconnect_backoff_ms: 60_000,
            stream_idle_timeout_secs: 300,
            acceptance_ratio: 0.8,
            learning_rate: 0.1,
            discount_factor: 0.99,
            log_json: false,
        }
    }
}

impl Config {
    /// Parse configuration from command-line args and environment variables
    pub fn parse_config() -> Self {
        Config::parse()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.mul_factor_enforcement == 0 {
            bail!("mul_factor_enforcement must be at least 1");
        }
        if self.max_agents_enforcement == 0 {
            bail!("max_agents_enforcement must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.acceptance_ratio) {
            bail!(
                "acceptance_ratio must be within [0, 1], got {}",
                self.acceptance_ratio
            );
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        if self.reconnect_backoff_ms > self.max_reconnect_backoff_ms {
            bail!("reconnect_backoff_ms must not exceed max_reconnect_backoff_ms");
        }
        Ok(())
    }

    pub fn enforcement(&self) -> EnforcementConfig {
        EnforcementConfig {
            max_agents: self.max_agents_enforcement,
            mul_factor: self.mul_factor_enforcement,
        }
    }

    pub fn prediction(&self) -> PredictionConfig {
        PredictionConfig {
            algorithm: self.algorithm,
            acceptance_ratio: self.acceptance_ratio,
            learning_rate: self.learning_rate,
            discount_factor: self.discount_factor,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff {
            initial: Duration::from_millis(self.reconnect_backoff_ms),
            max: Duration::from_millis(self.max_reconnect_backoff_ms),
        }
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        match self.stream_idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// SSE URLs of the created and updated report streams
    pub fn stream_urls(&self) -> Vec<String> {
        let base = self.event_manager_url.trim_end_matches('/');
        ReportStreamKind::ALL
            .iter()
            .map(|kind| format!("{}{}", base, kind.sse_path()))
            .collect()
    }

    pub fn jetstream(&self) -> JetStreamSettings {
        JetStreamSettings {
            nats_url: self.nats_url.clone(),
            creds_path: self.nats_creds_path.clone(),
            stream_name: self.stream_name.clone(),
            consumer_name: self.consumer_name.clone(),
        }
    }

    /// Check if scale-up requests are actually sent
    pub fn has_lifecycle_manager(&self) -> bool {
        self.lifecycle_manager_url.is_some() && !self.dry_run
    }
}
