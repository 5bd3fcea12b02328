//! Delivery of finished answers.
//!
//! An answer either goes straight to a caller in this process that is awaiting
//! it, or is cached for exactly one later pull. Never both, never neither.

use chrono::{DateTime, Utc};
use shared_types::Answer;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;

/// Success continuation of a caller awaiting one question
pub type CompletionHandle = oneshot::Sender<Answer>;

/// Success continuation of a caller awaiting a questionnaire
pub type CompositeCompletionHandle = oneshot::Sender<Vec<Answer>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    NotDelivered,
}

impl Delivery {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Delivery::Delivered)
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedAnswerEntry {
    pub answer: Answer,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ResolvedCompositeEntry {
    pub answers: Vec<Answer>,
    pub resolved_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct ResolutionChannel {
    waiters: HashMap<String, CompletionHandle>,
    composite_waiters: HashMap<String, CompositeCompletionHandle>,
    resolved: HashMap<String, ResolvedAnswerEntry>,
    resolved_composites: HashMap<String, ResolvedCompositeEntry>,
}

impl ResolutionChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_waiter(&mut self, question_id: &str, handle: CompletionHandle) {
        self.waiters.insert(question_id.to_string(), handle);
    }

    pub fn register_composite_waiter(
        &mut self,
        composite_id: &str,
        handle: CompositeCompletionHandle,
    ) {
        self.composite_waiters
            .insert(composite_id.to_string(), handle);
    }

    /// Drop a waiter without answering it (the caller got its answer some other way)
    pub fn drop_waiter(&mut self, question_id: &str) -> bool {
        self.waiters.remove(question_id).is_some()
    }

    pub fn drop_composite_waiter(&mut self, composite_id: &str) -> bool {
        self.composite_waiters.remove(composite_id).is_some()
    }

    pub fn has_waiter(&self, question_id: &str) -> bool {
        self.waiters.contains_key(question_id)
    }

    /// Hand the answer to a caller in this process awaiting exactly this question.
    /// A waiter whose receiver is gone counts as not delivered.
    pub fn try_deliver(&mut self, answer: &Answer) -> Delivery {
        match self.waiters.remove(&answer.question_id) {
            Some(handle) => match handle.send(answer.clone()) {
                Ok(()) => Delivery::Delivered,
                Err(_) => {
                    tracing::debug!(
                        question_id = %answer.question_id,
                        "Waiter went away before the answer arrived"
                    );
                    Delivery::NotDelivered
                }
            },
            None => Delivery::NotDelivered,
        }
    }

    pub fn try_deliver_composite(&mut self, composite_id: &str, answers: &[Answer]) -> Delivery {
        match self.composite_waiters.remove(composite_id) {
            Some(handle) => match handle.send(answers.to_vec()) {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::NotDelivered,
            },
            None => Delivery::NotDelivered,
        }
    }

    pub fn cache_for_poll(&mut self, answer: Answer, now: DateTime<Utc>) {
        tracing::debug!(question_id = %answer.question_id, "Caching answer for poll");
        self.resolved.insert(
            answer.question_id.clone(),
            ResolvedAnswerEntry {
                answer,
                resolved_at: now,
            },
        );
    }

    pub fn cache_composite_for_poll(
        &mut self,
        composite_id: &str,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) {
        tracing::debug!(composite_id, "Caching composite answers for poll");
        self.resolved_composites.insert(
            composite_id.to_string(),
            ResolvedCompositeEntry {
                answers,
                resolved_at: now,
            },
        );
    }

    /// Deliver synchronously if possible, otherwise cache exactly one entry
    pub fn settle(&mut self, answer: Answer, now: DateTime<Utc>) -> Delivery {
        let delivery = self.try_deliver(&answer);
        if !delivery.is_delivered() {
            self.cache_for_poll(answer, now);
        }
        delivery
    }

    pub fn settle_composite(
        &mut self,
        composite_id: &str,
        answers: Vec<Answer>,
        now: DateTime<Utc>,
    ) -> Delivery {
        let delivery = self.try_deliver_composite(composite_id, &answers);
        if !delivery.is_delivered() {
            self.cache_composite_for_poll(composite_id, answers, now);
        }
        delivery
    }

    /// One-shot retrieval: the first reader gets the answer, later readers get nothing
    pub fn pull_once(&mut self, question_id: &str) -> Option<Answer> {
        self.resolved.remove(question_id).map(|entry| entry.answer)
    }

    pub fn pull_composite_once(&mut self, composite_id: &str) -> Option<Vec<Answer>> {
        self.resolved_composites
            .remove(composite_id)
            .map(|entry| entry.answers)
    }

    /// Drop cached answers nobody polled for within `max_age`
    pub fn sweep_expired_cache_entries(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let is_fresh = |resolved_at: DateTime<Utc>| {
            (now - resolved_at).to_std().unwrap_or_default() <= max_age
        };

        let before = self.resolved.len() + self.resolved_composites.len();
        self.resolved.retain(|_, entry| is_fresh(entry.resolved_at));
        self.resolved_composites
            .retain(|_, entry| is_fresh(entry.resolved_at));
        before - (self.resolved.len() + self.resolved_composites.len())
    }

    pub fn cached_len(&self) -> usize {
        self.resolved.len() + self.resolved_composites.len()
    }
}
