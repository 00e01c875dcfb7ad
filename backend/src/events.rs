use amqprs::{
    callbacks::{DefaultChannelCallback, DefaultConnectionCallback},
    channel::{BasicPublishArguments, Channel, ExchangeDeclareArguments},
    connection::{Connection, OpenConnectionArguments},
    BasicProperties,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use friendship::Friendship;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::RabbitmqConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    RequestSent,
    RequestAccepted,
    RequestRejected,
    RequestCancelled,
    FriendRemoved,
    TierUpdated,
    UserBlocked,
    UserUnblocked,
    RequestsExpired,
}

impl EventKind {
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventKind::RequestSent => "friendship.request_sent",
            EventKind::RequestAccepted => "friendship.request_accepted",
            EventKind::RequestRejected => "friendship.request_rejected",
            EventKind::RequestCancelled => "friendship.request_cancelled",
            EventKind::FriendRemoved => "friendship.friend_removed",
            EventKind::TierUpdated => "friendship.tier_updated",
            EventKind::UserBlocked => "friendship.user_blocked",
            EventKind::UserUnblocked => "friendship.user_unblocked",
            EventKind::RequestsExpired => "friendship.requests_expired",
        }
    }
}

/// Notification about a change of one pair's relationship.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendshipEvent {
    pub kind: EventKind,
    /// `None` for changes made by the service itself, such as expiry.
    pub actor_id: Option<Uuid>,
    pub target_id: Uuid,
    pub friendship: Option<Friendship>,
    pub occurred_at: DateTime<Utc>,
}

impl FriendshipEvent {
    pub fn new(kind: EventKind, actor_id: Option<Uuid>, target_id: Uuid, friendship: Option<Friendship>) -> Self {
        Self {
            kind,
            actor_id,
            target_id,
            friendship,
            occurred_at: Utc::now(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("amqp error: {0}")]
    Amqp(#[from] amqprs::error::Error),

    #[error("unable to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &FriendshipEvent) -> Result<(), PublishError>;
}

/// Publishes to a topic exchange, one routing key per event kind.
pub struct RabbitmqPublisher {
    connection: Connection,
    channel: Mutex<Channel>,
    exchange: String,
}

async fn open_channel(connection: &Connection) -> Result<Channel, PublishError> {
    let channel = connection.open_channel(None).await?;
    channel.register_callback(DefaultChannelCallback).await?;
    Ok(channel)
}

impl RabbitmqPublisher {
    pub async fn connect(config: &RabbitmqConfig) -> Result<Self, PublishError> {
        let connection = Connection::open(&OpenConnectionArguments::new(
            &config.host,
            config.port,
            &config.username,
            &config.password,
        ))
        .await?;
        connection.register_callback(DefaultConnectionCallback).await?;

        let channel = open_channel(&connection).await?;
        channel
            .exchange_declare(ExchangeDeclareArguments::new(&config.exchange, "topic"))
            .await?;
        log::info!("publishing friendship events to exchange '{}'", config.exchange);

        Ok(Self {
            connection,
            channel: Mutex::new(channel),
            exchange: config.exchange.clone(),
        })
    }
}

#[async_trait]
impl EventPublisher for RabbitmqPublisher {
    async fn publish(&self, event: &FriendshipEvent) -> Result<(), PublishError> {
        let content = serde_json::to_vec(event)?;
        let mut channel = self.channel.lock().await;
        if !channel.is_open() {
            log::debug!("amqp channel is closed, reopening");
            *channel = open_channel(&self.connection).await?;
        }

        let args = BasicPublishArguments::new(&self.exchange, event.kind.routing_key());
        log::debug!("Publishing event {:?}. Publish args: {:?}", event.kind, args);
        channel
            .basic_publish(BasicProperties::default(), content, args)
            .await?;
        Ok(())
    }
}

/// Used when no broker is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, event: &FriendshipEvent) -> Result<(), PublishError> {
        log::info!(
            "{}: actor {:?}, target {}",
            event.kind.routing_key(),
            event.actor_id,
            event.target_id
        );
        Ok(())
    }
}

/// Keeps every published event; for tests.
#[derive(Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<FriendshipEvent>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<FriendshipEvent> {
        self.events.lock().await.clone()
    }

    pub async fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().await.iter().map(|event| event.kind).collect()
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, event: &FriendshipEvent) -> Result<(), PublishError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_camel_case() {
        let target = Uuid::new_v4();
        let event = FriendshipEvent::new(EventKind::RequestSent, None, target, None);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "request_sent");
        assert_eq!(json["targetId"], serde_json::json!(target));
        assert!(json["actorId"].is_null());
    }

    #[test]
    fn routing_keys_share_a_prefix() {
        for kind in [EventKind::RequestSent, EventKind::UserBlocked, EventKind::RequestsExpired] {
            assert!(kind.routing_key().starts_with("friendship."));
        }
    }
}
