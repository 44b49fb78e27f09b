use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::activity::Activity;

/// Failure while delivering an outbound activity. Sends are not retried;
/// the error bubbles to the adapter's turn-error handler.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to serialize outbound activity: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("connection closed before the activity was sent")]
    ConnectionClosed,
    #[error("transport send failed: {0}")]
    Transport(#[source] anyhow::Error),
}

/// Destination for outbound activities produced during a turn.
#[async_trait]
pub trait ActivitySink: Send + Sync {
    async fn send(&self, activity: Activity) -> Result<(), SendError>;
}

/// Collects sent activities in memory.
///
/// Backs the POST front door, where replies are returned in the HTTP
/// response body, and every test that asserts on sent activities.
#[derive(Default)]
pub struct BufferSink {
    sent: Mutex<Vec<Activity>>,
}

impl BufferSink {
    pub async fn take_sent(&self) -> Vec<Activity> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl ActivitySink for BufferSink {
    async fn send(&self, activity: Activity) -> Result<(), SendError> {
        self.sent.lock().await.push(activity);
        Ok(())
    }
}

/// One inbound activity plus the handle used to send replies for it.
///
/// Created per request, discarded when the request completes. Carries no
/// state across turns.
pub struct TurnContext {
    pub activity: Activity,
    sink: Arc<dyn ActivitySink>,
}

impl TurnContext {
    pub fn new(activity: Activity, sink: Arc<dyn ActivitySink>) -> Self {
        Self { activity, sink }
    }

    /// Sends an activity back to the caller, filling reply addressing from
    /// the inbound activity first.
    pub async fn send_activity(&self, mut activity: Activity) -> Result<(), SendError> {
        activity.apply_reply_defaults(&self.activity);
        self.sink.send(activity).await
    }

    /// Sends a plain text reply.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), SendError> {
        self.send_activity(Activity::message(text)).await
    }

    /// Sends a trace activity describing an error or diagnostic event.
    pub async fn send_trace(
        &self,
        name: impl Into<String>,
        label: impl Into<String>,
        value_type: impl Into<String>,
        value: serde_json::Value,
    ) -> Result<(), SendError> {
        self.send_activity(Activity::trace(name, label, value_type, value))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::{ActivityKind, ChannelAccount};

    fn inbound() -> Activity {
        let mut activity = Activity::message("hi");
        activity.id = "in-9".into();
        activity.from = Some(ChannelAccount::new("u1"));
        activity.recipient = Some(ChannelAccount::new("bot1"));
        activity
    }

    #[tokio::test]
    async fn send_text_buffers_a_reply_addressed_message() {
        let sink = Arc::new(BufferSink::default());
        let ctx = TurnContext::new(inbound(), sink.clone());

        ctx.send_text("pong").await.unwrap();

        let sent = sink.take_sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].kind, ActivityKind::Message);
        assert_eq!(sent[0].text.as_deref(), Some("pong"));
        assert_eq!(sent[0].recipient.as_ref().unwrap().id, "u1");
        assert_eq!(sent[0].reply_to_id.as_deref(), Some("in-9"));
    }

    #[tokio::test]
    async fn take_sent_drains_the_buffer() {
        let sink = Arc::new(BufferSink::default());
        let ctx = TurnContext::new(inbound(), sink.clone());
        ctx.send_text("one").await.unwrap();
        assert_eq!(sink.take_sent().await.len(), 1);
        assert!(sink.take_sent().await.is_empty());
    }
}
