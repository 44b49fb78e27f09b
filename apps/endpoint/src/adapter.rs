//! Per-turn processing pipeline: builds the turn context, runs the bot,
//! and routes any failure to the process-wide turn-error handler.
//!
//! Two instances exist at runtime: the standard adapter with activity
//! telemetry, and the streaming adapter without it.

use std::sync::Arc;

use futures::future::BoxFuture;
use metrics::counter;
use screambot_core::{Activity, ActivityKind, ActivitySink, TurnContext, ERROR_TRACE_VALUE_TYPE};
use screambot_telemetry::with_turn_fields;
use tracing::{Instrument, error, warn};

use crate::bot::ScreamBot;

/// Apology sent to the user after an unhandled turn failure.
pub const ERROR_APOLOGY: &str = "The bot encountered an error or bug.";

/// Catch-all invoked for every unhandled failure during turn processing.
/// A plain function value; no trait object hierarchy needed.
pub type TurnErrorHandler =
    Arc<dyn Fn(TurnContext, anyhow::Error) -> BoxFuture<'static, ()> + Send + Sync>;

/// Emits one trace activity describing the error, then one user-facing
/// apology. The turn's error is considered handled afterwards.
pub fn default_turn_error_handler() -> TurnErrorHandler {
    Arc::new(|ctx, err| {
        Box::pin(async move {
            error!(error = %err, "unhandled error during turn processing");
            if let Err(send_err) = ctx
                .send_trace(
                    "OnTurnError Trace",
                    "TurnError",
                    ERROR_TRACE_VALUE_TYPE,
                    serde_json::Value::String(err.to_string()),
                )
                .await
            {
                warn!(error = %send_err, "failed to deliver error trace");
            }
            if let Err(send_err) = ctx.send_text(ERROR_APOLOGY).await {
                warn!(error = %send_err, "failed to deliver error apology");
            }
        })
    })
}

pub struct Adapter {
    bot: Arc<ScreamBot>,
    on_turn_error: TurnErrorHandler,
    telemetry: bool,
}

impl Adapter {
    pub fn new(bot: Arc<ScreamBot>, on_turn_error: TurnErrorHandler, telemetry: bool) -> Self {
        Self {
            bot,
            on_turn_error,
            telemetry,
        }
    }

    /// Processes one decoded activity. Never returns an error: failures are
    /// consumed by the turn-error handler so the caller's response always
    /// completes.
    pub async fn process_activity(&self, activity: Activity, sink: Arc<dyn ActivitySink>) {
        let kind = kind_label(&activity.kind);
        let span = tracing::info_span!(
            "turn",
            kind = tracing::field::Empty,
            conversation = tracing::field::Empty,
            activity_id = tracing::field::Empty,
        );
        with_turn_fields(
            &span,
            kind,
            activity.conversation.as_ref().map(|c| c.id.as_str()),
            (!activity.id.is_empty()).then_some(activity.id.as_str()),
        );

        async {
            if self.telemetry {
                counter!("turns_total", "kind" => kind).increment(1);
            }
            let ctx = TurnContext::new(activity, sink);
            if let Err(err) = self.bot.on_turn(&ctx).await {
                if self.telemetry {
                    counter!("turn_errors_total", "kind" => kind).increment(1);
                }
                (self.on_turn_error)(ctx, err).await;
            }
        }
        .instrument(span)
        .await
    }
}

fn kind_label(kind: &ActivityKind) -> &'static str {
    match kind {
        ActivityKind::Message => "message",
        ActivityKind::ConversationUpdate => "conversation_update",
        ActivityKind::Trace => "trace",
        ActivityKind::Unknown => "unknown",
    }
}
