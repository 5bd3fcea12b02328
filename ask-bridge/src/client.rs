//! Asker-side API: dispatch a question and wait for its answer.
//!
//! The answer arrives either on the oneshot completion registered with the
//! hub, or, when the surface was forwarded to another process, by polling that
//! process's answer endpoint.

use crate::error::{AppError, AppResult};
use crate::hub::{
    AskQuestion, AskQuestionnaire, ExpireQuestion, ExpireQuestionnaire, ForgetQuestion,
    ForgetQuestionnaire, PollAnswer, PollCompositeAnswer, QuestionHub,
};
use crate::transport::Route;
use actix::Addr;
use shared_types::{Answer, Question, QuestionnaireAnswers};
use std::time::Duration;
use tokio::sync::oneshot;

/// Polls the UI-hosting process for answers resolved there
#[derive(Clone)]
pub struct RemoteAnswerClient {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl RemoteAnswerClient {
    pub fn new(peer_url: &str, timeout: Duration) -> AppResult<Self> {
        let base_url = reqwest::Url::parse(peer_url)
            .map_err(|e| AppError::InvalidRequest(format!("Invalid peer URL '{peer_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidRequest(format!(
                "Invalid peer URL '{peer_url}'"
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url })
    }

    pub fn answer_url(&self, question_id: &str) -> reqwest::Url {
        self.endpoint(&["api", "answers", question_id])
    }

    pub fn composite_answer_url(&self, composite_id: &str) -> reqwest::Url {
        self.endpoint(&["api", "composite-answers", composite_id])
    }

    /// One-shot pull from the peer; any failure is reported as "not yet"
    pub async fn fetch_answer(&self, question_id: &str) -> Option<Answer> {
        self.fetch(self.answer_url(question_id)).await
    }

    pub async fn fetch_composite_answer(&self, composite_id: &str) -> Option<Vec<Answer>> {
        self.fetch::<QuestionnaireAnswers>(self.composite_answer_url(composite_id))
            .await
            .map(|answers| answers.answers)
    }

    fn endpoint(&self, segments: &[&str]) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, url: reqwest::Url) -> Option<T> {
        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "Answer poll failed");
                return None;
            }
        };

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return None;
        }
        if !response.status().is_success() {
            tracing::warn!(url = %url, status = %response.status(), "Unexpected answer poll status");
            return None;
        }

        match response.json::<T>().await {
            Ok(body) => Some(body),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Failed to decode polled answer");
                None
            }
        }
    }
}

#[derive(Clone)]
pub struct QuestionClient {
    hub: Addr<QuestionHub>,
    remote: Option<RemoteAnswerClient>,
    default_timeout: Duration,
    poll_interval: Duration,
}

impl QuestionClient {
    pub fn new(
        hub: Addr<QuestionHub>,
        remote: Option<RemoteAnswerClient>,
        default_timeout: Duration,
        poll_interval: Duration,
    ) -> Self {
        Self {
            hub,
            remote,
            default_timeout,
            poll_interval,
        }
    }

    /// Ask one question and wait until it is answered, cancelled or timed out
    pub async fn ask(&self, question: Question, timeout: Option<Duration>) -> AppResult<Answer> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let question_id = question.id.clone();
        let (tx, mut rx) = oneshot::channel();

        let dispatched = self
            .hub
            .send(AskQuestion {
                question: question.clone(),
                timeout,
                completion: Some(tx),
            })
            .await??;
        let remote = self
            .remote
            .as_ref()
            .filter(|_| dispatched.route == Route::Forwarded);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                answer = &mut rx => {
                    return answer.map_err(|_| AppError::Internal(format!(
                        "Question '{question_id}' was dropped without an answer"
                    )));
                }
                _ = &mut deadline => {
                    self.hub
                        .send(ExpireQuestion { question_id: question_id.clone() })
                        .await?;
                    // Expiry settles through the completion; a racing answer wins
                    return Ok(rx.await.unwrap_or_else(|_| Answer::cancelled_for(&question)));
                }
                _ = poll.tick(), if remote.is_some() => {
                    let Some(remote) = remote else { continue };
                    if let Some(answer) = remote.fetch_answer(&question_id).await {
                        let forgotten = self
                            .hub
                            .send(ForgetQuestion { question_id: question_id.clone() })
                            .await?;
                        if !forgotten {
                            // Settled locally in the meantime; that answer is the one
                            if let Ok(local) = rx.try_recv() {
                                return Ok(local);
                            }
                        }
                        tracing::info!(question_id = %question_id, "Answer received from UI host");
                        return Ok(answer);
                    }
                }
            }
        }
    }

    /// Ask several questions answered together; returns one answer per question
    pub async fn ask_all(
        &self,
        composite_id: Option<String>,
        questions: Vec<Question>,
        timeout: Option<Duration>,
    ) -> AppResult<QuestionnaireAnswers> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        let composite_id =
            composite_id.unwrap_or_else(|| format!("questionnaire-{}", uuid::Uuid::new_v4()));
        let (tx, mut rx) = oneshot::channel();

        let dispatched = self
            .hub
            .send(AskQuestionnaire {
                composite_id: composite_id.clone(),
                questions: questions.clone(),
                timeout,
                completion: Some(tx),
            })
            .await??;
        let remote = self
            .remote
            .as_ref()
            .filter(|_| dispatched.route == Route::Forwarded);

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        let mut poll = tokio::time::interval(self.poll_interval);

        let answers = loop {
            tokio::select! {
                answers = &mut rx => {
                    break answers.map_err(|_| AppError::Internal(format!(
                        "Questionnaire '{composite_id}' was dropped without an answer"
                    )))?;
                }
                _ = &mut deadline => {
                    self.hub
                        .send(ExpireQuestionnaire { composite_id: composite_id.clone() })
                        .await?;
                    break rx.await.unwrap_or_else(|_| {
                        questions.iter().map(Answer::cancelled_for).collect()
                    });
                }
                _ = poll.tick(), if remote.is_some() => {
                    let Some(remote) = remote else { continue };
                    if let Some(answers) = remote.fetch_composite_answer(&composite_id).await {
                        let forgotten = self
                            .hub
                            .send(ForgetQuestionnaire { composite_id: composite_id.clone() })
                            .await?;
                        match rx.try_recv() {
                            Ok(local) if !forgotten => break local,
                            _ => break answers,
                        }
                    }
                }
            }
        };

        Ok(QuestionnaireAnswers {
            composite_id,
            answers,
        })
    }

    /// One-shot pull of an answer resolved without a waiter in this process
    pub async fn poll_answer(&self, question_id: &str) -> AppResult<Option<Answer>> {
        Ok(self
            .hub
            .send(PollAnswer {
                question_id: question_id.to_string(),
            })
            .await?)
    }

    pub async fn poll_composite_answer(&self, composite_id: &str) -> AppResult<Option<Vec<Answer>>> {
        Ok(self
            .hub
            .send(PollCompositeAnswer {
                composite_id: composite_id.to_string(),
            })
            .await?)
    }
}
