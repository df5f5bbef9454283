use std::sync::Arc;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use super::stream_hub::StreamHub;
use crate::models::aggregates::AggregateSnapshot;
use crate::models::job::ProviderTag;

/// Status block pushed to observers. Field names match what the dashboard consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressStatus {
    pub updating_data_window_visible: bool,
    pub downloading_data: bool,
    pub downloaded_offers_number: u32,
    pub remotive_count: u32,
    pub remote_ok_count: u32,
    pub adzuna_count: u32,
    pub joinrise_count: u32,
    #[serde(rename = "processingByAI")]
    pub processing_by_ai: bool,
    #[serde(rename = "processedByAINumber")]
    pub processed_by_ai_number: u32,
    pub saved_to_database: bool,
    pub cancelled: bool,
    pub failed: bool,
    /// Error tags gathered during the current page, space separated.
    pub error_message: String,
}

impl ProgressStatus {
    pub fn set_provider_count(&mut self, tag: ProviderTag, count: u32) {
        match tag {
            ProviderTag::Remotive => self.remotive_count = count,
            ProviderTag::RemoteOk => self.remote_ok_count = count,
            ProviderTag::Adzuna => self.adzuna_count = count,
            ProviderTag::Joinrise => self.joinrise_count = count,
        }
    }

    pub fn provider_count(&self, tag: ProviderTag) -> u32 {
        match tag {
            ProviderTag::Remotive => self.remotive_count,
            ProviderTag::RemoteOk => self.remote_ok_count,
            ProviderTag::Adzuna => self.adzuna_count,
            ProviderTag::Joinrise => self.joinrise_count,
        }
    }

    /// Terminal event for a run stopped by the user.
    pub fn cancelled() -> Self {
        Self {
            cancelled: true,
            ..Self::default()
        }
    }

    /// Terminal event for a run aborted by an unrecoverable error.
    pub fn failed(error_tags: &[String]) -> Self {
        Self {
            cancelled: true,
            failed: true,
            error_message: error_tags.join(" "),
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.cancelled || !self.updating_data_window_visible
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressMessage {
    Status(ProgressStatus),
    ChartMap(AggregateSnapshot),
}

impl ProgressMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ProgressMessage::Status(_) => "STATUS",
            ProgressMessage::ChartMap(_) => "CHART_MAP",
        }
    }
}

pub fn run_topic(run_id: Uuid) -> String {
    format!("dataUpdate:{run_id}")
}

/// A delivery transport for progress messages.
/// Implementations swallow and log their own failures; a run never waits on a retry.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn deliver(&self, run_id: Uuid, message: &ProgressMessage);
}

/// Fans progress out to every configured sink.
#[derive(Clone, Default)]
pub struct ProgressPublisher {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl ProgressPublisher {
    pub fn new(sinks: Vec<Arc<dyn ProgressSink>>) -> Self {
        Self { sinks }
    }

    pub async fn publish_status(&self, run_id: Uuid, status: &ProgressStatus) {
        self.publish(run_id, ProgressMessage::Status(status.clone())).await;
    }

    pub async fn publish_aggregates(&self, run_id: Uuid, snapshot: &AggregateSnapshot) {
        self.publish(run_id, ProgressMessage::ChartMap(snapshot.clone())).await;
    }

    async fn publish(&self, run_id: Uuid, message: ProgressMessage) {
        for sink in &self.sinks {
            sink.deliver(run_id, &message).await;
        }
    }
}

/// Publishes into the in-process hub that backs the SSE endpoint, and closes the run's
/// stream once its terminal status has gone out.
pub struct HubSink {
    hub: StreamHub,
}

impl HubSink {
    pub fn new(hub: StreamHub) -> Self {
        Self { hub }
    }
}

#[async_trait]
impl ProgressSink for HubSink {
    async fn deliver(&self, run_id: Uuid, message: &ProgressMessage) {
        match serde_json::to_value(message) {
            Ok(value) => self.hub.publish(run_id, value).await,
            Err(e) => warn!(%run_id, "Failed to encode progress message: {e}"),
        }
        if matches!(message, ProgressMessage::Status(status) if status.is_terminal()) {
            self.hub.close(run_id).await;
        }
    }
}

/// Publishes onto a Redis pub/sub channel named after the run topic.
pub struct RedisSink {
    conn: redis::aio::MultiplexedConnection,
}

impl RedisSink {
    pub async fn connect(client: &redis::Client) -> redis::RedisResult<Self> {
        Ok(Self {
            conn: client.get_multiplexed_async_connection().await?,
        })
    }
}

#[async_trait]
impl ProgressSink for RedisSink {
    async fn deliver(&self, run_id: Uuid, message: &ProgressMessage) {
        let topic = run_topic(run_id);
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                warn!(%topic, "Failed to encode progress message: {e}");
                return;
            }
        };

        let mut conn = self.conn.clone();
        if let Err(e) = conn.publish::<_, _, ()>(&topic, payload).await {
            warn!(%topic, kind = message.kind(), "Redis publish failed: {e}");
        }
    }
}
