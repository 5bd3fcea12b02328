//! Entry point for questions going out and UI events coming back.
//!
//! The dispatcher owns the pending registry, the selection store and the
//! resolution channel. It is driven by one logical thread (the hub actor), so
//! every method runs to completion before the next event is looked at.

use crate::error::{AppError, AppResult};
use crate::registry::{deadline, Origin, PendingQuestion, PendingRegistry};
use crate::resolution::{CompletionHandle, CompositeCompletionHandle, Delivery, ResolutionChannel};
use crate::selection::{resolve_value, Mutation, SelectionStore};
use crate::surface::{build_questionnaire_surface, build_surface, new_surface_id};
use crate::transport::{Route, TransportBridge};
use chrono::{DateTime, Utc};
use shared_types::{
    ActionId, ActionMessage, ActionParameters, Answer, AnswerValue, CancelNotice, Question,
    QuestionKind, SurfaceMessage,
};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a newly dispatched surface went
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub surface_id: String,
    pub route: Route,
}

pub struct QuestionDispatcher {
    registry: PendingRegistry,
    selections: SelectionStore,
    resolution: ResolutionChannel,
    transport: TransportBridge,
}

impl QuestionDispatcher {
    pub fn new(transport: TransportBridge) -> Self {
        Self {
            registry: PendingRegistry::new(),
            selections: SelectionStore::new(),
            resolution: ResolutionChannel::new(),
            transport,
        }
    }

    /// Register a question and deliver its surface
    pub fn dispatch_question(
        &mut self,
        question: Question,
        timeout: Duration,
        completion: Option<CompletionHandle>,
    ) -> AppResult<Dispatched> {
        question.validate().map_err(AppError::InvalidRequest)?;
        if self.registry.contains(&question.id) {
            return Err(AppError::InvalidRequest(format!(
                "Question '{}' is already pending",
                question.id
            )));
        }

        let now = Utc::now();
        let expires_at = checked_deadline(now, timeout)?.timestamp_millis();
        let surface_id = new_surface_id();
        self.register(PendingQuestion::new(question.clone(), &surface_id, timeout, now));
        if let Some(handle) = completion {
            self.resolution.register_waiter(&question.id, handle);
        }

        let route = self
            .transport
            .deliver_surface(build_surface(&surface_id, &question, expires_at));
        info!(
            question_id = %question.id,
            surface_id = %surface_id,
            kind = ?question.kind,
            route = ?route,
            "Dispatched question"
        );

        Ok(Dispatched { surface_id, route })
    }

    /// Register several questions answered together with `submit-all`
    pub fn dispatch_questionnaire(
        &mut self,
        composite_id: &str,
        questions: Vec<Question>,
        timeout: Duration,
        completion: Option<CompositeCompletionHandle>,
    ) -> AppResult<Dispatched> {
        if composite_id.trim().is_empty() {
            return Err(AppError::InvalidRequest(
                "Questionnaire has empty composite ID".to_string(),
            ));
        }
        if questions.is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "Questionnaire '{composite_id}' has no questions"
            )));
        }
        if !self.registry.composite_members(composite_id).is_empty() {
            return Err(AppError::InvalidRequest(format!(
                "Questionnaire '{composite_id}' is already pending"
            )));
        }

        let mut seen = HashSet::new();
        for question in &questions {
            question.validate().map_err(AppError::InvalidRequest)?;
            if !seen.insert(question.id.as_str()) {
                return Err(AppError::InvalidRequest(format!(
                    "Duplicate question ID: {}",
                    question.id
                )));
            }
            if self.registry.contains(&question.id) {
                return Err(AppError::InvalidRequest(format!(
                    "Question '{}' is already pending",
                    question.id
                )));
            }
        }

        let now = Utc::now();
        let expires_at = checked_deadline(now, timeout)?.timestamp_millis();
        let surface_id = new_surface_id();
        for question in &questions {
            let pending = PendingQuestion::new(question.clone(), &surface_id, timeout, now)
                .in_composite(composite_id);
            self.register(pending);
        }
        if let Some(handle) = completion {
            self.resolution.register_composite_waiter(composite_id, handle);
        }

        let surface =
            build_questionnaire_surface(&surface_id, composite_id, &questions, expires_at);
        let route = self.transport.deliver_surface(surface);
        info!(
            composite_id,
            surface_id = %surface_id,
            questions = questions.len(),
            route = ?route,
            "Dispatched questionnaire"
        );

        Ok(Dispatched { surface_id, route })
    }

    /// Apply one UI event. Returns whether it was recognized and applied;
    /// malformed, late and duplicate events are dropped without touching state.
    pub fn handle_inbound_event(&mut self, event: ActionMessage) -> bool {
        let ActionMessage {
            action_id,
            surface_id,
            parameters,
        } = event;

        match action_id {
            ActionId::Unknown => {
                debug!(surface_id = %surface_id, "Ignoring unrecognized action");
                false
            }
            ActionId::SubmitAll => self.handle_submit_all(parameters),
            ActionId::Cancel if parameters.question_id.is_none() => {
                match parameters.composite_id.as_deref() {
                    Some(composite_id) => self.cancel_questionnaire(composite_id),
                    None => {
                        debug!("Ignoring cancel without question or composite ID");
                        false
                    }
                }
            }
            _ => self.handle_question_event(action_id, parameters),
        }
    }

    fn handle_question_event(&mut self, action_id: ActionId, parameters: ActionParameters) -> bool {
        let Some(question_id) = parameters.question_id else {
            debug!(action = ?action_id, "Ignoring action without question ID");
            return false;
        };
        let Some(pending) = self.registry.lookup(&question_id) else {
            debug!(
                question_id = %question_id,
                action = ?action_id,
                "Ignoring action for question that is not pending"
            );
            return false;
        };
        let kind = pending.question.kind;
        let in_composite = pending.composite_id.is_some();

        match action_id {
            ActionId::Confirm if kind == QuestionKind::Confirm && !in_composite => {
                let answer = Answer::answered(&question_id, AnswerValue::Bool(true));
                self.finish(&question_id, answer);
                true
            }
            ActionId::Cancel if !in_composite => self.cancel_question(&question_id),
            ActionId::Select if kind == QuestionKind::Select => match parameters.value {
                Some(value) => {
                    self.selections.apply(&question_id, Mutation::Select(value));
                    true
                }
                None => false,
            },
            ActionId::Toggle if kind == QuestionKind::MultiSelect => {
                match (parameters.value, parameters.checked) {
                    (Some(value), Some(checked)) => {
                        self.selections
                            .apply(&question_id, Mutation::Toggle { value, checked });
                        true
                    }
                    _ => false,
                }
            }
            ActionId::InputChange => {
                let Some(text) = parameters.value else {
                    return false;
                };
                let mutation = match kind {
                    QuestionKind::Input => Mutation::Text(text),
                    QuestionKind::Select | QuestionKind::MultiSelect => Mutation::OtherText(text),
                    QuestionKind::Confirm => return false,
                };
                self.selections.apply(&question_id, mutation);
                true
            }
            ActionId::Submit if kind != QuestionKind::Confirm && !in_composite => {
                let entry = self.selections.take(&question_id);
                let question = self.registry.lookup(&question_id).map(|p| &p.question);
                let value = resolve_value(entry, question);
                self.finish(&question_id, Answer::answered(&question_id, value));
                true
            }
            _ => {
                debug!(
                    question_id = %question_id,
                    action = ?action_id,
                    kind = ?kind,
                    "Ignoring action that does not apply to this question"
                );
                false
            }
        }
    }

    fn handle_submit_all(&mut self, parameters: ActionParameters) -> bool {
        let Some(composite_id) = parameters.composite_id else {
            debug!("Ignoring submit-all without composite ID");
            return false;
        };
        let question_ids = parameters
            .question_ids
            .unwrap_or_else(|| self.registry.composite_members(&composite_id));

        if !question_ids
            .iter()
            .any(|id| self.registry.is_member(id, &composite_id))
        {
            debug!(composite_id = %composite_id, "Ignoring submit-all for questions that are not pending");
            return false;
        }

        // A sub-question without recorded state answers "" rather than failing the whole set.
        // Questions pending outside this questionnaire are left alone and answered "" here.
        let now = Utc::now();
        let mut answers = Vec::with_capacity(question_ids.len());
        for question_id in &question_ids {
            if !self.registry.is_member(question_id, &composite_id) {
                if self.registry.contains(question_id) {
                    debug!(
                        composite_id = %composite_id,
                        question_id = %question_id,
                        "submit-all names a question outside this questionnaire; leaving it pending"
                    );
                }
                answers.push(Answer::answered(question_id, AnswerValue::Text(String::new())));
                continue;
            }
            let entry = self.selections.take(question_id);
            let pending = self.registry.remove(question_id);
            let value = resolve_value(entry, pending.as_ref().map(|p| &p.question));
            if let Some(pending) = &pending {
                self.transport.forget_surface(&pending.surface_id);
            }
            answers.push(Answer::answered(question_id, value));
        }

        for leftover in self.registry.composite_members(&composite_id) {
            warn!(
                composite_id = %composite_id,
                question_id = %leftover,
                "Questionnaire member missing from submit-all; discarding"
            );
            self.registry.remove(&leftover);
            self.selections.take(&leftover);
        }

        let delivery = self
            .resolution
            .settle_composite(&composite_id, answers, now);
        info!(composite_id = %composite_id, delivery = ?delivery, "Questionnaire submitted");
        true
    }

    fn cancel_question(&mut self, question_id: &str) -> bool {
        let Some(pending) = self.remove(question_id) else {
            return false;
        };
        self.retract(&pending);
        let answer = Answer::cancelled_for(&pending.question);
        let delivery = self.resolution.settle(answer, Utc::now());
        info!(question_id, delivery = ?delivery, "Question cancelled");
        true
    }

    fn cancel_questionnaire(&mut self, composite_id: &str) -> bool {
        let members = self.registry.composite_members(composite_id);
        if members.is_empty() {
            debug!(composite_id, "Ignoring cancel for questionnaire that is not pending");
            return false;
        }

        let mut answers = Vec::with_capacity(members.len());
        for question_id in members {
            if let Some(pending) = self.remove(&question_id) {
                self.retract(&pending);
                answers.push(Answer::cancelled_for(&pending.question));
            }
        }

        let delivery = self
            .resolution
            .settle_composite(composite_id, answers, Utc::now());
        info!(composite_id, delivery = ?delivery, "Questionnaire cancelled");
        true
    }

    /// Cancel a question whose asker gave up waiting. No-op if it already finished.
    pub fn expire_question(&mut self, question_id: &str) -> bool {
        let Some(pending) = self.registry.lookup(question_id) else {
            return false;
        };
        match pending.composite_id.clone() {
            Some(composite_id) => self.cancel_questionnaire(&composite_id),
            None => self.cancel_question(question_id),
        }
    }

    pub fn expire_questionnaire(&mut self, composite_id: &str) -> bool {
        self.cancel_questionnaire(composite_id)
    }

    /// Cancel every question whose own timeout has elapsed. Returns how many were removed.
    pub fn expire_overdue(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.registry.len();
        for question_id in self.registry.expired(now) {
            // Earlier iterations may already have removed fellow questionnaire members
            if self.registry.contains(&question_id) {
                warn!(question_id = %question_id, "Question timed out");
                self.expire_question(&question_id);
            }
        }
        before - self.registry.len()
    }

    /// Remove questions pending for longer than `max_age`, cancelling each one
    pub fn sweep_stale(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let swept = self.registry.sweep(max_age, now);
        let count = swept.len();

        let mut composites: BTreeMap<String, Vec<Answer>> = BTreeMap::new();
        for pending in swept {
            self.selections.take(&pending.question_id);
            self.retract(&pending);
            let answer = Answer::cancelled_for(&pending.question);
            match &pending.composite_id {
                Some(composite_id) => composites
                    .entry(composite_id.clone())
                    .or_default()
                    .push(answer),
                None => {
                    self.resolution.settle(answer, now);
                }
            }
        }
        for (composite_id, answers) in composites {
            self.resolution.settle_composite(&composite_id, answers, now);
        }

        if count > 0 {
            warn!(count, "Swept abandoned questions");
        }
        count
    }

    pub fn sweep_cache(&mut self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let removed = self.resolution.sweep_expired_cache_entries(max_age, now);
        if removed > 0 {
            debug!(removed, "Dropped answers nobody polled for");
        }
        removed
    }

    /// Drop a question whose answer reached the asker through polling elsewhere.
    /// No answer is produced here.
    pub fn forget_question(&mut self, question_id: &str) -> bool {
        self.resolution.drop_waiter(question_id);
        match self.remove(question_id) {
            Some(pending) => {
                self.transport.forget_surface(&pending.surface_id);
                true
            }
            None => false,
        }
    }

    pub fn forget_questionnaire(&mut self, composite_id: &str) -> bool {
        self.resolution.drop_composite_waiter(composite_id);
        let members = self.registry.composite_members(composite_id);
        for question_id in &members {
            if let Some(pending) = self.remove(question_id) {
                self.transport.forget_surface(&pending.surface_id);
            }
        }
        !members.is_empty()
    }

    /// Accept a surface forwarded by another process: register its questions here
    /// without a waiter (answers land in the poll cache) and rebroadcast it unchanged.
    pub fn register_forwarded(&mut self, surface: SurfaceMessage) -> usize {
        let now = Utc::now();
        let mut registered = 0;
        for state in &surface.initial_state.questions {
            if self.registry.contains(&state.question_id) {
                continue;
            }
            let remaining = state
                .expires_at
                .saturating_sub(now.timestamp_millis())
                .max(0) as u64;
            let mut pending = PendingQuestion::new(
                state.to_question(),
                &surface.surface_id,
                Duration::from_millis(remaining),
                now,
            )
            .forwarded();
            if let Some(composite_id) = &surface.initial_state.composite_id {
                pending = pending.in_composite(composite_id);
            }
            self.register(pending);
            registered += 1;
        }

        info!(
            surface_id = %surface.surface_id,
            registered,
            "Accepted forwarded surface"
        );
        self.transport.broadcast_surface(surface);
        registered
    }

    /// Accept a cancel notice forwarded by the asking process
    pub fn retract_forwarded(&mut self, notice: CancelNotice) -> bool {
        let forwarded = self
            .registry
            .lookup(&notice.question_id)
            .is_some_and(|pending| pending.origin == Origin::Forwarded);
        let removed = forwarded && self.remove(&notice.question_id).is_some();
        self.transport.broadcast_cancel(notice);
        removed
    }

    /// A UI connection attached: replay buffered surfaces that are still open
    pub fn client_attached(&mut self, client_id: &str) -> usize {
        let registry = &self.registry;
        self.transport.replay_buffered_surfaces(client_id, |surface| {
            surface.question_ids().any(|id| registry.contains(id))
        })
    }

    /// A UI signalled readiness: rebuild a surface for every pending question
    pub fn client_ready(&mut self, client_id: &str) -> usize {
        // Questionnaire members share a surface; keep surfaces in creation order
        let mut surfaces: Vec<(String, Vec<&PendingQuestion>)> = Vec::new();
        for pending in self.registry.all() {
            match surfaces
                .iter_mut()
                .find(|(surface_id, _)| *surface_id == pending.surface_id)
            {
                Some((_, members)) => members.push(pending),
                None => surfaces.push((pending.surface_id.clone(), vec![pending])),
            }
        }

        let rebuilt: Vec<SurfaceMessage> = surfaces
            .into_iter()
            .map(|(surface_id, members)| {
                let expires_at = members[0].expires_at().timestamp_millis();
                match &members[0].composite_id {
                    Some(composite_id) => {
                        let questions: Vec<Question> =
                            members.iter().map(|p| p.question.clone()).collect();
                        build_questionnaire_surface(
                            &surface_id,
                            composite_id,
                            &questions,
                            expires_at,
                        )
                    }
                    None => build_surface(&surface_id, &members[0].question, expires_at),
                }
            })
            .collect();

        let count = rebuilt.len();
        for surface in rebuilt {
            self.transport.send_surface_to(client_id, surface);
        }
        info!(client_id, surfaces = count, "Resent open questions to ready client");
        count
    }

    pub fn pull_once(&mut self, question_id: &str) -> Option<Answer> {
        self.resolution.pull_once(question_id)
    }

    pub fn pull_composite_once(&mut self, composite_id: &str) -> Option<Vec<Answer>> {
        self.resolution.pull_composite_once(composite_id)
    }

    pub fn pending_count(&self) -> usize {
        self.registry.len()
    }

    pub fn registry(&self) -> &PendingRegistry {
        &self.registry
    }

    pub fn selections(&self) -> &SelectionStore {
        &self.selections
    }

    pub fn resolution(&self) -> &ResolutionChannel {
        &self.resolution
    }

    fn register(&mut self, pending: PendingQuestion) {
        match pending.question.kind {
            QuestionKind::Select => self.selections.init_single(&pending.question_id),
            QuestionKind::MultiSelect => self.selections.init_multi(&pending.question_id),
            QuestionKind::Confirm | QuestionKind::Input => {}
        }
        self.registry.register(pending);
    }

    /// Remove a question and its selection state together
    fn remove(&mut self, question_id: &str) -> Option<PendingQuestion> {
        self.selections.take(question_id);
        self.registry.remove(question_id)
    }

    /// Tell UIs to drop the surface. Forwarded questions are only retracted locally.
    fn retract(&mut self, pending: &PendingQuestion) {
        let notice = CancelNotice {
            surface_id: pending.surface_id.clone(),
            question_id: pending.question_id.clone(),
        };
        match pending.origin {
            Origin::Local => {
                self.transport.deliver_cancel(notice);
            }
            Origin::Forwarded => self.transport.broadcast_cancel(notice),
        }
    }

    fn finish(&mut self, question_id: &str, answer: Answer) -> Delivery {
        if let Some(pending) = self.remove(question_id) {
            self.transport.forget_surface(&pending.surface_id);
        }
        let delivery = self.resolution.settle(answer, Utc::now());
        info!(question_id, delivery = ?delivery, "Question answered");
        delivery
    }
}

fn checked_deadline(now: DateTime<Utc>, timeout: Duration) -> AppResult<DateTime<Utc>> {
    deadline(now, timeout).ok_or_else(|| {
        AppError::InvalidRequest(format!("Timeout of {}s is too large", timeout.as_secs()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{RecordingConnections, RecordingForwarder};
    use shared_types::{OutboundMessage, QuestionOption};
    use std::sync::Arc;
    use tokio::sync::oneshot;

    const TIMEOUT: Duration = Duration::from_secs(60);

    struct Fixture {
        dispatcher: QuestionDispatcher,
        connections: Arc<RecordingConnections>,
        forwarder: Arc<RecordingForwarder>,
    }

    fn fixture(clients: usize) -> Fixture {
        let connections = RecordingConnections::with_clients(clients);
        let forwarder = Arc::new(RecordingForwarder::default());
        let transport = TransportBridge::new(connections.clone(), Some(forwarder.clone()), 8);
        Fixture {
            dispatcher: QuestionDispatcher::new(transport),
            connections,
            forwarder,
        }
    }

    fn options(values: &[&str]) -> Vec<QuestionOption> {
        values
            .iter()
            .map(|v| QuestionOption::new(*v, v.to_uppercase()))
            .collect()
    }

    #[test]
    fn test_select_last_selection_wins() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::select("q", "Pick", options(&["a", "b"])), TIMEOUT, None)
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::select("q", "a")));
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::select("q", "b")));
        assert_eq!(f.dispatcher.pending_count(), 1);
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::submit("q")));

        let answer = f.dispatcher.pull_once("q").unwrap();
        assert_eq!(answer.value, AnswerValue::Text("b".to_string()));
        assert!(!answer.cancelled);
        assert_eq!(f.dispatcher.pending_count(), 0);
        assert!(f.dispatcher.selections().is_empty());
    }

    #[test]
    fn test_multi_select_toggles() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(
                Question::multi_select("q", "Pick", options(&["a", "b", "c"])),
                TIMEOUT,
                None,
            )
            .unwrap();

        for event in [
            ActionMessage::toggle("q", "a", true),
            ActionMessage::toggle("q", "b", true),
            ActionMessage::toggle("q", "a", false),
            ActionMessage::submit("q"),
        ] {
            assert!(f.dispatcher.handle_inbound_event(event));
        }

        let answer = f.dispatcher.pull_once("q").unwrap();
        assert_eq!(answer.value, AnswerValue::List(vec!["b".to_string()]));
        assert!(!answer.cancelled);
    }

    #[test]
    fn test_confirm_cancel_produces_cancelled_false() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::confirm("q", "Proceed?"), TIMEOUT, None)
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::cancel("q")));

        let answer = f.dispatcher.pull_once("q").unwrap();
        assert_eq!(answer.value, AnswerValue::Bool(false));
        assert!(answer.cancelled);
        assert!(f.dispatcher.registry().lookup("q").is_none());
        assert!(matches!(
            f.connections.broadcasts().last(),
            Some(OutboundMessage::Cancel(notice)) if notice.question_id == "q"
        ));
    }

    #[test]
    fn test_confirm_delivers_to_waiter() {
        let mut f = fixture(1);
        let (tx, mut rx) = oneshot::channel();
        f.dispatcher
            .dispatch_question(Question::confirm("q", "Proceed?"), TIMEOUT, Some(tx))
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::confirm("q")));

        let answer = rx.try_recv().unwrap();
        assert_eq!(answer.value, AnswerValue::Bool(true));
        assert!(f.dispatcher.pull_once("q").is_none());
    }

    #[test]
    fn test_submit_without_selection_is_empty() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::select("s", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();
        f.dispatcher
            .dispatch_question(Question::multi_select("m", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::submit("s")));
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::submit("m")));

        assert_eq!(
            f.dispatcher.pull_once("s").unwrap().value,
            AnswerValue::Text(String::new())
        );
        assert_eq!(
            f.dispatcher.pull_once("m").unwrap().value,
            AnswerValue::List(Vec::new())
        );
    }

    #[test]
    fn test_other_option_resolves_to_typed_text() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::select("q", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();

        f.dispatcher
            .handle_inbound_event(ActionMessage::select("q", shared_types::OTHER_OPTION_VALUE));
        f.dispatcher
            .handle_inbound_event(ActionMessage::input_change("q", "something else"));
        f.dispatcher.handle_inbound_event(ActionMessage::submit("q"));

        assert_eq!(
            f.dispatcher.pull_once("q").unwrap().value,
            AnswerValue::Text("something else".to_string())
        );
    }

    #[test]
    fn test_input_question() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::input("name", "Name?"), TIMEOUT, None)
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::input_change("name", "Ad")));
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::input_change("name", "Ada")));
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::submit("name")));

        assert_eq!(
            f.dispatcher.pull_once("name").unwrap().value,
            AnswerValue::Text("Ada".to_string())
        );
    }

    #[test]
    fn test_second_submit_is_a_no_op() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::select("q", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();
        f.dispatcher.handle_inbound_event(ActionMessage::select("q", "a"));

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::submit("q")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::submit("q")));

        assert!(f.dispatcher.pull_once("q").is_some());
        assert!(f.dispatcher.pull_once("q").is_none());
        assert_eq!(f.dispatcher.resolution().cached_len(), 0);
    }

    #[test]
    fn test_cancel_then_submit_is_a_no_op() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::select("q", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::cancel("q")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::submit("q")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::select("q", "a")));

        let answer = f.dispatcher.pull_once("q").unwrap();
        assert!(answer.cancelled);
        assert_eq!(answer.value, AnswerValue::None);
    }

    #[test]
    fn test_malformed_events_are_not_handled() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::multi_select("q", "Pick", options(&["a"])), TIMEOUT, None)
            .unwrap();

        let unknown = ActionMessage::new(ActionId::Unknown, ActionParameters::question("q"));
        let missing_id = ActionMessage::new(ActionId::Submit, ActionParameters::default());
        let mut missing_checked = ActionMessage::toggle("q", "a", true);
        missing_checked.parameters.checked = None;

        assert!(!f.dispatcher.handle_inbound_event(unknown));
        assert!(!f.dispatcher.handle_inbound_event(missing_id));
        assert!(!f.dispatcher.handle_inbound_event(missing_checked));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::select("q", "a")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::confirm("q")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::submit("ghost")));

        assert_eq!(f.dispatcher.pending_count(), 1);
        assert_eq!(
            f.dispatcher.selections().get("q").and_then(|e| e.selection.clone()),
            Some(crate::selection::Selection::Multi(Vec::new()))
        );
    }

    #[test]
    fn test_duplicate_question_id_is_rejected() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::confirm("q", "Once"), TIMEOUT, None)
            .unwrap();

        let result = f
            .dispatcher
            .dispatch_question(Question::confirm("q", "Twice"), TIMEOUT, None);
        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert_eq!(f.dispatcher.pending_count(), 1);
    }

    #[test]
    fn test_invalid_question_is_rejected() {
        let mut f = fixture(1);
        let result = f
            .dispatcher
            .dispatch_question(Question::select("q", "Pick", vec![]), TIMEOUT, None);
        assert!(result.is_err());
        assert_eq!(f.dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_submit_all_defaults_missing_answers_to_empty() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_questionnaire(
                "form",
                vec![
                    Question::select("q1", "First", options(&["x", "y"])),
                    Question::input("q2", "Second"),
                ],
                TIMEOUT,
                None,
            )
            .unwrap();

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::select("q1", "x")));
        assert!(f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["q1", "q2"])));

        let answers = f.dispatcher.pull_composite_once("form").unwrap();
        assert_eq!(
            answers,
            vec![
                Answer::answered("q1", AnswerValue::Text("x".to_string())),
                Answer::answered("q2", AnswerValue::Text(String::new())),
            ]
        );
        assert_eq!(f.dispatcher.pending_count(), 0);
        assert!(f.dispatcher.selections().is_empty());

        assert!(!f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["q1", "q2"])));
    }

    #[test]
    fn test_submit_all_is_lenient_about_unknown_members() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_questionnaire(
                "form",
                vec![Question::multi_select("q1", "First", options(&["x", "y"]))],
                TIMEOUT,
                None,
            )
            .unwrap();
        f.dispatcher
            .handle_inbound_event(ActionMessage::toggle("q1", "y", true));

        assert!(f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["q1", "nope"])));

        let answers = f.dispatcher.pull_composite_once("form").unwrap();
        assert_eq!(answers[0].value, AnswerValue::List(vec!["y".to_string()]));
        assert_eq!(answers[1].value, AnswerValue::Text(String::new()));
    }

    #[test]
    fn test_submit_all_leaves_questions_outside_the_questionnaire() {
        let mut f = fixture(1);
        let (solo_tx, mut solo_rx) = oneshot::channel();
        let (other_tx, mut other_rx) = oneshot::channel();
        f.dispatcher
            .dispatch_question(Question::confirm("solo", "Proceed?"), TIMEOUT, Some(solo_tx))
            .unwrap();
        f.dispatcher
            .dispatch_questionnaire("other", vec![Question::input("o1", "Other")], TIMEOUT, Some(other_tx))
            .unwrap();
        f.dispatcher
            .dispatch_questionnaire("form", vec![Question::input("q1", "Name")], TIMEOUT, None)
            .unwrap();

        // Naming only foreign questions is not a submit for this questionnaire
        assert!(!f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["solo", "o1"])));

        f.dispatcher
            .handle_inbound_event(ActionMessage::input_change("q1", "Ada"));
        assert!(f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["q1", "solo", "o1"])));

        let answers = f.dispatcher.pull_composite_once("form").unwrap();
        assert_eq!(answers[0].value, AnswerValue::Text("Ada".to_string()));
        assert_eq!(answers.len(), 3);

        assert!(f.dispatcher.registry().contains("solo"));
        assert!(f.dispatcher.registry().is_member("o1", "other"));
        assert!(f.dispatcher.resolution().has_waiter("solo"));

        assert!(f.dispatcher.handle_inbound_event(ActionMessage::confirm("solo")));
        assert_eq!(solo_rx.try_recv().unwrap().value, AnswerValue::Bool(true));

        assert!(f
            .dispatcher
            .handle_inbound_event(ActionMessage::submit_all("other", &["o1"])));
        assert_eq!(other_rx.try_recv().unwrap().len(), 1);
        assert_eq!(f.dispatcher.pending_count(), 0);
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let mut f = fixture(1);
        for timeout in [
            Duration::from_secs(10_000_000_000_000),
            Duration::from_secs(u64::MAX / 100),
        ] {
            let result = f
                .dispatcher
                .dispatch_question(Question::confirm("q", "Proceed?"), timeout, None);
            assert!(matches!(result, Err(AppError::InvalidRequest(_))));

            let result = f.dispatcher.dispatch_questionnaire(
                "form",
                vec![Question::input("i", "Why?")],
                timeout,
                None,
            );
            assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        }

        assert_eq!(f.dispatcher.pending_count(), 0);
        assert!(f.connections.broadcasts().is_empty());
        assert_eq!(f.dispatcher.expire_overdue(Utc::now()), 0);
    }

    #[test]
    fn test_forwarded_surface_with_extreme_expiry() {
        let mut host = fixture(1);
        let question = Question::confirm("late", "Late?");
        host.dispatcher
            .register_forwarded(build_surface("s-min", &question, i64::MIN));
        assert!(host.dispatcher.registry().contains("late"));
        assert_eq!(host.dispatcher.expire_overdue(Utc::now()), 1);

        let question = Question::confirm("never", "Never?");
        host.dispatcher
            .register_forwarded(build_surface("s-max", &question, i64::MAX));
        assert_eq!(host.dispatcher.expire_overdue(Utc::now()), 0);
        assert_eq!(host.dispatcher.pending_count(), 1);
        assert_eq!(host.dispatcher.client_ready("ui-1"), 1);
    }

    #[test]
    fn test_questionnaire_members_reject_single_terminal_actions() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_questionnaire(
                "form",
                vec![Question::confirm("c", "Sure?"), Question::input("i", "Why?")],
                TIMEOUT,
                None,
            )
            .unwrap();

        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::confirm("c")));
        assert!(!f.dispatcher.handle_inbound_event(ActionMessage::submit("i")));
        assert!(f.dispatcher.handle_inbound_event(ActionMessage::cancel_all("form")));

        let answers = f.dispatcher.pull_composite_once("form").unwrap();
        assert!(answers.iter().all(|a| a.cancelled));
        assert_eq!(answers.len(), 2);
    }

    #[test]
    fn test_questionnaire_delivers_to_composite_waiter() {
        let mut f = fixture(1);
        let (tx, mut rx) = oneshot::channel();
        f.dispatcher
            .dispatch_questionnaire("form", vec![Question::input("q1", "Name")], TIMEOUT, Some(tx))
            .unwrap();

        f.dispatcher
            .handle_inbound_event(ActionMessage::input_change("q1", "Ada"));
        f.dispatcher
            .handle_inbound_event(ActionMessage::submit_all("form", &["q1"]));

        let answers = rx.try_recv().unwrap();
        assert_eq!(answers[0].value, AnswerValue::Text("Ada".to_string()));
        assert!(f.dispatcher.pull_composite_once("form").is_none());
    }

    #[test]
    fn test_expire_overdue_cancels_once() {
        let mut f = fixture(1);
        let (tx, mut rx) = oneshot::channel();
        f.dispatcher
            .dispatch_question(Question::confirm("q", "Proceed?"), Duration::from_secs(5), Some(tx))
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(10);
        assert_eq!(f.dispatcher.expire_overdue(later), 1);
        assert_eq!(f.dispatcher.expire_overdue(later), 0);
        assert!(!f.dispatcher.expire_question("q"));

        let answer = rx.try_recv().unwrap();
        assert!(answer.cancelled);
        assert_eq!(answer.value, AnswerValue::Bool(false));
        assert_eq!(f.dispatcher.resolution().cached_len(), 0);
    }

    #[test]
    fn test_expire_overdue_leaves_fresh_questions() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::confirm("q", "Proceed?"), TIMEOUT, None)
            .unwrap();

        assert_eq!(f.dispatcher.expire_overdue(Utc::now()), 0);
        assert_eq!(f.dispatcher.pending_count(), 1);
    }

    #[test]
    fn test_sweep_stale_cancels_abandoned_questions() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(
                Question::select("q", "Pick", options(&["a"])),
                Duration::from_secs(100_000),
                None,
            )
            .unwrap();
        f.dispatcher.handle_inbound_event(ActionMessage::select("q", "a"));

        let later = Utc::now() + chrono::Duration::hours(2);
        assert_eq!(f.dispatcher.sweep_stale(Duration::from_secs(3600), later), 1);
        assert!(f.dispatcher.selections().is_empty());
        assert!(f.dispatcher.pull_once("q").unwrap().cancelled);
    }

    #[test]
    fn test_forwards_surface_when_no_ui_attached() {
        let mut f = fixture(0);
        let dispatched = f
            .dispatcher
            .dispatch_question(Question::confirm("q", "Proceed?"), TIMEOUT, None)
            .unwrap();

        assert_eq!(dispatched.route, Route::Forwarded);
        assert!(f.connections.broadcasts().is_empty());
        assert!(matches!(
            f.forwarder.forwarded().as_slice(),
            [OutboundMessage::Surface(surface)] if surface.initial_state.questions[0].question_id == "q"
        ));

        f.dispatcher.handle_inbound_event(ActionMessage::cancel("q"));
        assert!(matches!(
            f.forwarder.forwarded().last(),
            Some(OutboundMessage::Cancel(_))
        ));
    }

    #[test]
    fn test_forwarded_surface_is_answerable_and_cached() {
        let mut asker = fixture(0);
        asker
            .dispatcher
            .dispatch_question(Question::select("q", "Pick", options(&["a", "b"])), TIMEOUT, None)
            .unwrap();
        let surface = match asker.forwarder.forwarded().remove(0) {
            OutboundMessage::Surface(surface) => surface,
            other => panic!("expected surface, got {:?}", other),
        };

        let mut host = fixture(1);
        assert_eq!(host.dispatcher.register_forwarded(surface.clone()), 1);
        assert_eq!(host.connections.broadcasts(), vec![OutboundMessage::Surface(surface)]);

        host.dispatcher.handle_inbound_event(ActionMessage::select("q", "b"));
        host.dispatcher.handle_inbound_event(ActionMessage::submit("q"));

        let answer = host.dispatcher.pull_once("q").unwrap();
        assert_eq!(answer.value, AnswerValue::Text("b".to_string()));

        assert!(asker.dispatcher.forget_question("q"));
        assert_eq!(asker.dispatcher.pending_count(), 0);
        assert!(asker.dispatcher.pull_once("q").is_none());
    }

    #[test]
    fn test_forwarded_cancel_retracts_without_answer() {
        let mut host = fixture(1);
        let surface = build_surface("s-1", &Question::confirm("q", "Go?"), Utc::now().timestamp_millis() + 60_000);
        host.dispatcher.register_forwarded(surface);

        assert!(host.dispatcher.retract_forwarded(CancelNotice {
            surface_id: "s-1".to_string(),
            question_id: "q".to_string(),
        }));
        assert_eq!(host.dispatcher.pending_count(), 0);
        assert!(host.dispatcher.pull_once("q").is_none());
    }

    #[test]
    fn test_client_ready_rebuilds_every_pending_surface() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::confirm("a", "A?"), TIMEOUT, None)
            .unwrap();
        f.dispatcher
            .dispatch_questionnaire(
                "form",
                vec![Question::input("b", "B?"), Question::input("c", "C?")],
                TIMEOUT,
                None,
            )
            .unwrap();

        assert_eq!(f.dispatcher.client_ready("ui-1"), 2);
        let direct = f.connections.direct();
        assert_eq!(direct.len(), 2);
        assert!(direct.iter().all(|(client, _)| client == "ui-1"));
    }

    #[test]
    fn test_client_attached_replays_only_open_surfaces() {
        let mut f = fixture(1);
        f.dispatcher
            .dispatch_question(Question::confirm("a", "A?"), TIMEOUT, None)
            .unwrap();
        f.dispatcher
            .dispatch_question(Question::confirm("b", "B?"), TIMEOUT, None)
            .unwrap();
        f.dispatcher.handle_inbound_event(ActionMessage::confirm("a"));

        assert_eq!(f.dispatcher.client_attached("ui-2"), 1);
    }
}
