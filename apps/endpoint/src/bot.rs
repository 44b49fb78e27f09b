//! The turn handler: one conditional for message turns, one loop for
//! membership changes. No state is kept between turns.

use std::sync::Arc;

use anyhow::Result;
use screambot_core::{ActivityKind, AnswerSource, TurnContext};
use tracing::debug;

/// Reply used when the knowledge base has no matching answer.
pub const FALLBACK_ANSWER: &str = "What's that noise?";
/// Greeting sent to each newly added member.
///
/// The deployed configuration carries a `WelcomeText` value, but the
/// original bot never read it on membership turns; that observed behavior
/// is kept.
pub const GREETING: &str = "Hello.";

pub struct ScreamBot {
    qna: Arc<dyn AnswerSource>,
}

impl ScreamBot {
    pub fn new(qna: Arc<dyn AnswerSource>) -> Self {
        Self { qna }
    }

    /// Processes one turn, dispatching on the activity kind.
    pub async fn on_turn(&self, ctx: &TurnContext) -> Result<()> {
        match ctx.activity.kind {
            ActivityKind::Message => self.on_message(ctx).await,
            ActivityKind::ConversationUpdate => self.on_members_added(ctx).await,
            ActivityKind::Trace | ActivityKind::Unknown => Ok(()),
        }
    }

    async fn on_message(&self, ctx: &TurnContext) -> Result<()> {
        let answers = self.qna.get_answers(ctx).await?;
        match answers.first() {
            Some(top) => ctx.send_text(top.answer.clone()).await?,
            None => {
                debug!("no knowledge base match, sending fallback");
                ctx.send_text(FALLBACK_ANSWER).await?;
            }
        }
        Ok(())
    }

    async fn on_members_added(&self, ctx: &TurnContext) -> Result<()> {
        let recipient_id = ctx
            .activity
            .recipient
            .as_ref()
            .map(|account| account.id.as_str())
            .unwrap_or_default();
        for member in &ctx.activity.members_added {
            if member.id != recipient_id {
                ctx.send_text(GREETING).await?;
            }
        }
        Ok(())
    }
}
