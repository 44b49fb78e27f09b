//! HTTP front door: one POST route for single activities and a WebSocket
//! upgrade on the same path for streamed activities.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Json, Router,
    body::Body,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderValue, Request, header::HeaderName},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use screambot_core::{Activity, ActivitySink, BufferSink, SendError};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::adapter::Adapter;

#[derive(Clone)]
pub struct AppState {
    /// Standard adapter, activity telemetry enabled.
    pub adapter: Arc<Adapter>,
    /// Streaming adapter, configured without the telemetry middleware.
    pub streaming: Arc<Adapter>,
}

/// Response body of the POST route: every activity sent during the turn.
#[derive(Debug, Serialize)]
pub struct ActivityBatch {
    pub activities: Vec<Activity>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/messages", post(messages).get(stream_upgrade))
        .with_state(state)
        .layer(middleware::from_fn(with_request_id))
}

pub async fn with_request_id(mut req: Request<Body>, next: Next) -> Response {
    let rid = Uuid::new_v4().to_string();
    req.extensions_mut().insert(rid.clone());

    let mut res = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&rid) {
        res.headers_mut()
            .insert(HeaderName::from_static("x-request-id"), value);
    }
    res
}

/// Decodes one POSTed activity and runs it through the standard adapter.
/// Malformed bodies are rejected by extraction before the handler runs.
/// The response always completes; a failed turn leaves the error trace and
/// apology in the batch instead of an answer.
async fn messages(State(state): State<AppState>, Json(activity): Json<Activity>) -> Response {
    let sink = Arc::new(BufferSink::default());
    state.adapter.process_activity(activity, sink.clone()).await;
    Json(ActivityBatch {
        activities: sink.take_sent().await,
    })
    .into_response()
}

/// Accepts a connection upgrade and processes every streamed activity with
/// the streaming adapter.
async fn stream_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_stream(socket, state.streaming))
}

async fn run_stream(socket: WebSocket, adapter: Arc<Adapter>) {
    let (tx, mut rx) = socket.split();
    let sink: Arc<dyn ActivitySink> = Arc::new(WsSink {
        tx: tokio::sync::Mutex::new(tx),
    });

    while let Some(frame) = rx.next().await {
        match frame {
            Ok(Message::Text(raw)) => match serde_json::from_str::<Activity>(raw.as_str()) {
                Ok(activity) => adapter.process_activity(activity, sink.clone()).await,
                Err(err) => warn!(error = %err, "discarding undecodable streamed activity"),
            },
            Ok(Message::Close(_)) => {
                debug!("streaming channel closed by the client");
                break;
            }
            Ok(_) => continue,
            Err(err) => {
                warn!(error = %err, "streaming receive failed, closing channel");
                break;
            }
        }
    }
}

/// Sends outbound activities as text frames on the streaming channel.
struct WsSink {
    tx: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
}

#[async_trait]
impl ActivitySink for WsSink {
    async fn send(&self, activity: Activity) -> Result<(), SendError> {
        let frame = serde_json::to_string(&activity).map_err(SendError::Serialize)?;
        let mut tx = self.tx.lock().await;
        tx.send(Message::Text(frame.into()))
            .await
            .map_err(|e| SendError::Transport(anyhow::Error::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::default_turn_error_handler;
    use crate::bot::ScreamBot;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use screambot_core::{AnswerCandidate, InMemoryAnswerSource};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn router_with(source: InMemoryAnswerSource) -> Router {
        let bot = Arc::new(ScreamBot::new(Arc::new(source)));
        let on_error = default_turn_error_handler();
        build_router(AppState {
            adapter: Arc::new(Adapter::new(bot.clone(), on_error.clone(), true)),
            streaming: Arc::new(Adapter::new(bot, on_error, false)),
        })
    }

    async fn post_activity(router: Router, payload: Value) -> (StatusCode, Value) {
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn post_relays_the_top_answer() {
        let router = router_with(InMemoryAnswerSource::fixed(vec![AnswerCandidate {
            answer: "9-5".into(),
            score: 0.9,
            id: 1,
            questions: vec![],
        }]));
        let (status, body) =
            post_activity(router, json!({"type": "message", "text": "hours?"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activities"].as_array().unwrap().len(), 1);
        assert_eq!(body["activities"][0]["text"], "9-5");
    }

    #[tokio::test]
    async fn post_falls_back_when_the_knowledge_base_is_silent() {
        let router = router_with(InMemoryAnswerSource::fixed(vec![]));
        let (status, body) = post_activity(router, json!({"type": "message", "text": "hi"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["activities"][0]["text"], "What's that noise?");
    }

    #[tokio::test]
    async fn post_greets_added_members_except_the_recipient() {
        let router = router_with(InMemoryAnswerSource::fixed(vec![]));
        let (status, body) = post_activity(
            router,
            json!({
                "type": "conversationUpdate",
                "membersAdded": [{"id": "u1"}, {"id": "bot1"}],
                "recipient": {"id": "bot1"}
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let activities = body["activities"].as_array().unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0]["text"], "Hello.");
    }

    #[tokio::test]
    async fn post_completes_with_trace_and_apology_on_turn_failure() {
        let router = router_with(InMemoryAnswerSource::new(|_| {
            Err(screambot_core::QnaError::Status {
                status: 502,
                body: "upstream down".into(),
            })
        }));
        let (status, body) = post_activity(router, json!({"type": "message", "text": "hi"})).await;

        assert_eq!(status, StatusCode::OK);
        let activities = body["activities"].as_array().unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0]["type"], "trace");
        assert_eq!(activities[1]["text"], "The bot encountered an error or bug.");
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected_before_the_handler() {
        let router = router_with(InMemoryAnswerSource::new(|_| panic!("must not run")));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let router = router_with(InMemoryAnswerSource::fixed(vec![]));
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/messages")
                    .header("content-type", "application/json")
                    .body(Body::from(json!({"type": "message", "text": "hi"}).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
