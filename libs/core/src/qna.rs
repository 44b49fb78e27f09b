//! Client for the hosted question-answering service.
//!
//! One outbound HTTPS call per message turn; failures are never retried
//! here and surface to the adapter's turn-error handler.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::turn::TurnContext;

/// Default number of candidates requested per query.
pub const DEFAULT_TOP: u32 = 1;
/// Default minimum confidence posted with each query, on the 0-1 scale the
/// query body uses (responses report scores 0-100).
pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.3;
/// Sentinel candidate id the service uses for "no good match".
const NO_MATCH_ID: i64 = -1;

/// Connection parameters for one knowledge base, read once at startup.
#[derive(Debug, Clone)]
pub struct QnaEndpoint {
    pub knowledge_base_id: String,
    pub endpoint_key: String,
    pub host: String,
}

impl QnaEndpoint {
    /// Full URL of the generateAnswer operation for this knowledge base.
    pub fn query_url(&self) -> String {
        let mut host = self.host.trim_end_matches('/').to_string();
        if !host.starts_with("http") {
            host = format!("https://{host}");
        }
        format!(
            "{host}/knowledgebases/{kb}/generateAnswer",
            kb = self.knowledge_base_id
        )
    }
}

/// A ranked answer returned by the service. Scores are normalized to 0-1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerCandidate {
    pub answer: String,
    pub score: f64,
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub questions: Vec<String>,
}

#[derive(Debug, Error)]
pub enum QnaError {
    #[error("message activity carries no text to query with")]
    EmptyUtterance,
    #[error("QnA request failed: {0}")]
    Http(#[source] anyhow::Error),
    #[error("QnA endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode QnA response: {0}")]
    Deserialize(#[source] serde_json::Error),
}

/// Source of ranked answers for a message turn.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Returns candidates ordered by descending score, possibly empty.
    async fn get_answers(&self, ctx: &TurnContext) -> Result<Vec<AnswerCandidate>, QnaError>;
}

fn utterance(ctx: &TurnContext) -> Result<&str, QnaError> {
    match ctx.activity.text.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text),
        _ => Err(QnaError::EmptyUtterance),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QnaQuery<'a> {
    question: &'a str,
    top: u32,
    score_threshold: f64,
}

#[derive(Debug, Deserialize)]
struct QnaQueryResponse {
    #[serde(default)]
    answers: Vec<RawAnswer>,
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    score: f64,
    #[serde(default = "no_match_id")]
    id: i64,
    #[serde(default)]
    questions: Vec<String>,
}

fn no_match_id() -> i64 {
    NO_MATCH_ID
}

/// Drops the "no match" sentinel, normalizes scores, and orders best-first.
fn candidates_from_response(response: QnaQueryResponse) -> Vec<AnswerCandidate> {
    let mut candidates: Vec<AnswerCandidate> = response
        .answers
        .into_iter()
        .filter(|raw| raw.id != NO_MATCH_ID)
        .map(|raw| AnswerCandidate {
            answer: raw.answer,
            score: raw.score / 100.0,
            id: raw.id,
            questions: raw.questions,
        })
        .collect();
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    candidates
}

/// HTTP implementation backed by a shared reqwest client.
pub struct QnaClient {
    client: reqwest::Client,
    endpoint: QnaEndpoint,
    top: u32,
    score_threshold: f64,
}

impl QnaClient {
    pub fn new(endpoint: QnaEndpoint) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            top: DEFAULT_TOP,
            score_threshold: DEFAULT_SCORE_THRESHOLD,
        }
    }
}

#[async_trait]
impl AnswerSource for QnaClient {
    async fn get_answers(&self, ctx: &TurnContext) -> Result<Vec<AnswerCandidate>, QnaError> {
        let question = utterance(ctx)?;
        let url = self.endpoint.query_url();
        debug!(%url, "querying knowledge base");

        let response = self
            .client
            .post(&url)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("EndpointKey {}", self.endpoint.endpoint_key),
            )
            .json(&QnaQuery {
                question,
                top: self.top,
                score_threshold: self.score_threshold,
            })
            .send()
            .await
            .map_err(|e| QnaError::Http(anyhow::Error::new(e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(QnaError::Status { status, body });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| QnaError::Http(anyhow::Error::new(e)))?;
        let parsed: QnaQueryResponse =
            serde_json::from_slice(&body).map_err(QnaError::Deserialize)?;
        Ok(candidates_from_response(parsed))
    }
}

/// Closure-backed answer source used in tests.
pub struct InMemoryAnswerSource {
    responder: Box<dyn Fn(&str) -> Result<Vec<AnswerCandidate>, QnaError> + Send + Sync>,
}

impl InMemoryAnswerSource {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&str) -> Result<Vec<AnswerCandidate>, QnaError> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
        }
    }

    /// Source that answers every question with the given candidates.
    pub fn fixed(candidates: Vec<AnswerCandidate>) -> Self {
        Self::new(move |_| Ok(candidates.clone()))
    }
}

#[async_trait]
impl AnswerSource for InMemoryAnswerSource {
    async fn get_answers(&self, ctx: &TurnContext) -> Result<Vec<AnswerCandidate>, QnaError> {
        let question = utterance(ctx)?;
        (self.responder)(question)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::Activity;
    use crate::turn::BufferSink;
    use std::sync::Arc;

    fn message_ctx(text: &str) -> TurnContext {
        TurnContext::new(Activity::message(text), Arc::new(BufferSink::default()))
    }

    #[test]
    fn query_url_handles_bare_and_schemed_hosts() {
        let mut endpoint = QnaEndpoint {
            knowledge_base_id: "kb-1".into(),
            endpoint_key: "key".into(),
            host: "https://example.azurewebsites.net/qnamaker/".into(),
        };
        assert_eq!(
            endpoint.query_url(),
            "https://example.azurewebsites.net/qnamaker/knowledgebases/kb-1/generateAnswer"
        );
        endpoint.host = "example.azurewebsites.net/qnamaker".into();
        assert_eq!(
            endpoint.query_url(),
            "https://example.azurewebsites.net/qnamaker/knowledgebases/kb-1/generateAnswer"
        );
    }

    #[test]
    fn candidates_drop_sentinel_and_normalize_scores() {
        let parsed: QnaQueryResponse = serde_json::from_str(
            r#"{"answers":[
                {"answer":"No good match found in KB.","score":0.0,"id":-1},
                {"answer":"9-5","score":90.0,"id":3},
                {"answer":"weekends closed","score":45.5,"id":7}
            ]}"#,
        )
        .unwrap();
        let candidates = candidates_from_response(parsed);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].answer, "9-5");
        assert!((candidates[0].score - 0.9).abs() < 1e-9);
        assert_eq!(candidates[1].answer, "weekends closed");
    }

    #[test]
    fn candidates_are_ordered_best_first() {
        let parsed: QnaQueryResponse = serde_json::from_str(
            r#"{"answers":[
                {"answer":"b","score":20.0,"id":2},
                {"answer":"a","score":80.0,"id":1}
            ]}"#,
        )
        .unwrap();
        let candidates = candidates_from_response(parsed);
        assert_eq!(candidates[0].answer, "a");
        assert_eq!(candidates[1].answer, "b");
    }

    #[test]
    fn empty_answer_list_decodes_to_no_candidates() {
        let parsed: QnaQueryResponse = serde_json::from_str(r#"{"answers":[]}"#).unwrap();
        assert!(candidates_from_response(parsed).is_empty());
    }

    #[tokio::test]
    async fn blank_utterance_is_rejected_before_any_call() {
        let source = InMemoryAnswerSource::new(|_| panic!("must not be queried"));
        let err = source.get_answers(&message_ctx("   ")).await.unwrap_err();
        assert!(matches!(err, QnaError::EmptyUtterance));
    }

    #[tokio::test]
    async fn in_memory_source_sees_the_trimmed_question() {
        let source = InMemoryAnswerSource::new(|question| {
            assert_eq!(question, "hours?");
            Ok(vec![])
        });
        let answers = source.get_answers(&message_ctx(" hours? ")).await.unwrap();
        assert!(answers.is_empty());
    }
}
