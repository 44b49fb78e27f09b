use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Wire value type attached to error traces, displayed by channel emulators.
pub const ERROR_TRACE_VALUE_TYPE: &str = "https://www.botframework.com/schemas/error";

/// Activity kind, dispatched on by the turn handler.
///
/// Every wire value outside the handled set decodes to [`ActivityKind::Unknown`]
/// and passes through turn processing as a no-op.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Message,
    /// Membership change. Some callers label these turns by their payload
    /// (`membersAdded`) rather than the canonical wire name, so both decode
    /// here.
    #[serde(alias = "membersAdded")]
    ConversationUpdate,
    Trace,
    #[serde(other)]
    Unknown,
}

/// One unit of conversational payload exchanged with the messaging channel.
///
/// ```
/// use screambot_core::{Activity, ActivityKind};
///
/// let activity: Activity = serde_json::from_str(r#"{"type":"message","text":"hi"}"#).unwrap();
/// assert_eq!(activity.kind, ActivityKind::Message);
/// assert_eq!(activity.text.as_deref(), Some("hi"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub timestamp: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members_added: Vec<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Activity {
    /// Creates a bare activity of the given kind with an empty payload.
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            kind,
            id: String::new(),
            timestamp: None,
            from: None,
            recipient: None,
            conversation: None,
            text: None,
            members_added: Vec::new(),
            reply_to_id: None,
            service_url: None,
            channel_id: None,
            locale: None,
            name: None,
            label: None,
            value_type: None,
            value: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Builds an outbound message activity carrying the given text.
    pub fn message(text: impl Into<String>) -> Self {
        let mut activity = Self::new(ActivityKind::Message);
        activity.text = Some(text.into());
        activity
    }

    /// Builds an outbound trace activity, the shape channel emulators render
    /// for error reporting.
    pub fn trace(
        name: impl Into<String>,
        label: impl Into<String>,
        value_type: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        let mut activity = Self::new(ActivityKind::Trace);
        activity.name = Some(name.into());
        activity.label = Some(label.into());
        activity.value_type = Some(value_type.into());
        activity.value = Some(value);
        activity
    }

    /// Fills reply addressing and identity from the inbound activity.
    ///
    /// The sender and recipient of the inbound activity are swapped, the
    /// conversation and channel references are carried over, and a fresh id
    /// and timestamp are assigned when missing.
    pub fn apply_reply_defaults(&mut self, inbound: &Activity) {
        if self.id.trim().is_empty() {
            self.id = Uuid::new_v4().to_string();
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(OffsetDateTime::now_utc());
        }
        if self.from.is_none() {
            self.from = inbound.recipient.clone();
        }
        if self.recipient.is_none() {
            self.recipient = inbound.from.clone();
        }
        if self.conversation.is_none() {
            self.conversation = inbound.conversation.clone();
        }
        if self.service_url.is_none() {
            self.service_url = inbound.service_url.clone();
        }
        if self.channel_id.is_none() {
            self.channel_id = inbound.channel_id.clone();
        }
        if self.reply_to_id.is_none() && !inbound.id.trim().is_empty() {
            self.reply_to_id = Some(inbound.id.clone());
        }
    }
}

/// A participant of a conversation, bot included.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl ChannelAccount {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            role: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ConversationAccount {
    pub id: String,
}
