use std::net::SocketAddr;

use anyhow::{Context, Result};
use screambot_core::QnaEndpoint;

pub const DEFAULT_PORT: u16 = 3978;

/// Process-wide configuration, read once at startup and passed by reference
/// into constructors. Never mutated afterwards.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub addr: SocketAddr,
    pub app_id: Option<String>,
    pub app_password: Option<String>,
    pub channel_service: Option<String>,
    pub open_id_metadata: Option<String>,
    pub qna: QnaEndpoint,
    pub welcome_text: Option<String>,
    pub instrumentation_key: Option<String>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        let port = optional("port")
            .or_else(|| optional("PORT"))
            .map(|raw| raw.parse::<u16>().context("invalid port value"))
            .transpose()?
            .unwrap_or(DEFAULT_PORT);

        let qna = QnaEndpoint {
            knowledge_base_id: required("QnAKnowledgebaseId")?,
            endpoint_key: required("QnAAuthKey")?,
            host: required("QnAEndpointHostName")?,
        };

        Ok(Self {
            addr: SocketAddr::from(([0, 0, 0, 0], port)),
            app_id: optional("MicrosoftAppId"),
            app_password: optional("MicrosoftAppPassword"),
            channel_service: optional("ChannelService"),
            open_id_metadata: optional("BotOpenIdMetadata"),
            qna,
            welcome_text: optional("WelcomeText"),
            instrumentation_key: optional("APPINSIGHTS_INSTRUMENTATIONKEY"),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn required(name: &str) -> Result<String> {
    optional(name).with_context(|| format!("missing required configuration value `{name}`"))
}
