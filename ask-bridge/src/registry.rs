use chrono::{DateTime, Utc};
use shared_types::Question;
use std::collections::HashMap;
use std::time::Duration;

/// Where the asker of a pending question lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Asked by a caller in this process
    Local,
    /// Received as a forwarded surface; the asker polls this process for the answer
    Forwarded,
}

/// A question that is currently awaiting an answer
#[derive(Debug, Clone)]
pub struct PendingQuestion {
    pub question_id: String,
    pub surface_id: String,
    pub question: Question,
    /// Set for members of a questionnaire answered with `submit-all`
    pub composite_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub timeout: Duration,
    pub origin: Origin,
    /// Registration order; breaks ties between questions created in the same instant
    sequence: u64,
}

impl PendingQuestion {
    pub fn new(
        question: Question,
        surface_id: impl Into<String>,
        timeout: Duration,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            question_id: question.id.clone(),
            surface_id: surface_id.into(),
            question,
            composite_id: None,
            created_at,
            timeout,
            origin: Origin::Local,
            sequence: 0,
        }
    }

    pub fn in_composite(mut self, composite_id: impl Into<String>) -> Self {
        self.composite_id = Some(composite_id.into());
        self
    }

    pub fn forwarded(mut self) -> Self {
        self.origin = Origin::Forwarded;
        self
    }

    /// Saturates at the last representable instant for timeouts too large to add
    pub fn expires_at(&self) -> DateTime<Utc> {
        deadline(self.created_at, self.timeout).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.created_at).to_std().unwrap_or_default()
    }

    fn order_key(&self) -> (DateTime<Utc>, u64) {
        (self.created_at, self.sequence)
    }
}

/// `created_at + timeout`, or `None` when that falls outside the representable range
pub fn deadline(created_at: DateTime<Utc>, timeout: Duration) -> Option<DateTime<Utc>> {
    let timeout = chrono::Duration::from_std(timeout).ok()?;
    created_at.checked_add_signed(timeout)
}

/// Tracks which questions are open. At most one entry per question id.
#[derive(Debug, Default)]
pub struct PendingRegistry {
    questions: HashMap<String, PendingQuestion>,
    next_sequence: u64,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` and leaves the registry untouched if the id is already pending
    pub fn register(&mut self, mut pending: PendingQuestion) -> bool {
        if self.questions.contains_key(&pending.question_id) {
            return false;
        }
        pending.sequence = self.next_sequence;
        self.next_sequence += 1;
        self.questions.insert(pending.question_id.clone(), pending);
        true
    }

    pub fn lookup(&self, question_id: &str) -> Option<&PendingQuestion> {
        self.questions.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.questions.contains_key(question_id)
    }

    pub fn remove(&mut self, question_id: &str) -> Option<PendingQuestion> {
        self.questions.remove(question_id)
    }

    /// Remove every question older than `max_age`. Questions answered normally are
    /// already gone by the time this runs, so only abandoned ones are returned.
    pub fn sweep(&mut self, max_age: Duration, now: DateTime<Utc>) -> Vec<PendingQuestion> {
        let mut stale: Vec<&PendingQuestion> = self
            .questions
            .values()
            .filter(|pending| pending.age(now) > max_age)
            .collect();
        stale.sort_by_key(|pending| pending.order_key());
        let stale: Vec<String> = stale
            .into_iter()
            .map(|pending| pending.question_id.clone())
            .collect();

        stale
            .iter()
            .filter_map(|question_id| self.questions.remove(question_id))
            .collect()
    }

    /// Ids of questions whose own timeout has elapsed, oldest first
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut expired: Vec<&PendingQuestion> = self
            .questions
            .values()
            .filter(|pending| pending.is_expired(now))
            .collect();
        expired.sort_by_key(|pending| pending.order_key());
        expired
            .into_iter()
            .map(|pending| pending.question_id.clone())
            .collect()
    }

    pub fn is_member(&self, question_id: &str, composite_id: &str) -> bool {
        self.questions
            .get(question_id)
            .is_some_and(|pending| pending.composite_id.as_deref() == Some(composite_id))
    }

    /// Member ids of a questionnaire, oldest first
    pub fn composite_members(&self, composite_id: &str) -> Vec<String> {
        let mut members: Vec<&PendingQuestion> = self
            .questions
            .values()
            .filter(|pending| pending.composite_id.as_deref() == Some(composite_id))
            .collect();
        members.sort_by_key(|pending| pending.order_key());
        members
            .into_iter()
            .map(|pending| pending.question_id.clone())
            .collect()
    }

    /// All pending questions, oldest first
    pub fn all(&self) -> Vec<&PendingQuestion> {
        let mut all: Vec<&PendingQuestion> = self.questions.values().collect();
        all.sort_by_key(|pending| pending.order_key());
        all
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
