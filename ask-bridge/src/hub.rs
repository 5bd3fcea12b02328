//! The question hub actor.
//!
//! All dispatcher state is owned by this actor, so every dispatch, UI event,
//! poll and sweep is processed one at a time from its mailbox.

use crate::config::QuestionsConfig;
use crate::dispatcher::{Dispatched, QuestionDispatcher};
use crate::error::AppResult;
use crate::resolution::{CompletionHandle, CompositeCompletionHandle};
use actix::prelude::*;
use chrono::Utc;
use shared_types::{ActionMessage, Answer, CancelNotice, Question, SurfaceMessage};
use std::time::Duration;

/// Maintenance intervals and ages for the hub timer
#[derive(Debug, Clone)]
pub struct HubSettings {
    pub sweep_interval: Duration,
    pub stale_after: Duration,
    pub answer_ttl: Duration,
}

impl From<&QuestionsConfig> for HubSettings {
    fn from(config: &QuestionsConfig) -> Self {
        Self {
            sweep_interval: config.sweep_interval(),
            stale_after: config.stale_after(),
            answer_ttl: config.answer_ttl(),
        }
    }
}

pub struct QuestionHub {
    dispatcher: QuestionDispatcher,
    settings: HubSettings,
}

impl QuestionHub {
    pub fn new(dispatcher: QuestionDispatcher, settings: HubSettings) -> Self {
        Self {
            dispatcher,
            settings,
        }
    }

    fn maintain(&mut self) {
        let now = Utc::now();
        let expired = self.dispatcher.expire_overdue(now);
        let stale = self
            .dispatcher
            .sweep_stale(self.settings.stale_after, now);
        let cached = self.dispatcher.sweep_cache(self.settings.answer_ttl, now);

        if expired + stale + cached > 0 {
            tracing::debug!(expired, stale, cached, "Hub maintenance pass");
        }
    }
}

impl Actor for QuestionHub {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            sweep_interval = ?self.settings.sweep_interval,
            "Question hub started"
        );
        ctx.run_interval(self.settings.sweep_interval, |act, _| act.maintain());
    }
}

#[derive(Message)]
#[rtype(result = "AppResult<Dispatched>")]
pub struct AskQuestion {
    pub question: Question,
    pub timeout: Duration,
    pub completion: Option<CompletionHandle>,
}

#[derive(Message)]
#[rtype(result = "AppResult<Dispatched>")]
pub struct AskQuestionnaire {
    pub composite_id: String,
    pub questions: Vec<Question>,
    pub timeout: Duration,
    pub completion: Option<CompositeCompletionHandle>,
}

/// A UI event, from a WebSocket connection or the HTTP API
#[derive(Message)]
#[rtype(result = "bool")]
pub struct InboundAction(pub ActionMessage);

#[derive(Message)]
#[rtype(result = "Option<Answer>")]
pub struct PollAnswer {
    pub question_id: String,
}

#[derive(Message)]
#[rtype(result = "Option<Vec<Answer>>")]
pub struct PollCompositeAnswer {
    pub composite_id: String,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct ExpireQuestion {
    pub question_id: String,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct ExpireQuestionnaire {
    pub composite_id: String,
}

/// The asker obtained the answer from the UI-hosting process
#[derive(Message)]
#[rtype(result = "bool")]
pub struct ForgetQuestion {
    pub question_id: String,
}

#[derive(Message)]
#[rtype(result = "bool")]
pub struct ForgetQuestionnaire {
    pub composite_id: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct ClientAttached {
    pub client_id: String,
}

#[derive(Message)]
#[rtype(result = "usize")]
pub struct ClientReady {
    pub client_id: String,
}

/// A surface forwarded by another process
#[derive(Message)]
#[rtype(result = "usize")]
pub struct RemoteSurface(pub SurfaceMessage);

#[derive(Message)]
#[rtype(result = "bool")]
pub struct RemoteCancel(pub CancelNotice);

#[derive(Message)]
#[rtype(result = "usize")]
pub struct PendingCount;

impl Handler<AskQuestion> for QuestionHub {
    type Result = AppResult<Dispatched>;

    fn handle(&mut self, msg: AskQuestion, _: &mut Self::Context) -> Self::Result {
        self.dispatcher
            .dispatch_question(msg.question, msg.timeout, msg.completion)
    }
}

impl Handler<AskQuestionnaire> for QuestionHub {
    type Result = AppResult<Dispatched>;

    fn handle(&mut self, msg: AskQuestionnaire, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.dispatch_questionnaire(
            &msg.composite_id,
            msg.questions,
            msg.timeout,
            msg.completion,
        )
    }
}

impl Handler<InboundAction> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: InboundAction, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.handle_inbound_event(msg.0)
    }
}

impl Handler<PollAnswer> for QuestionHub {
    type Result = Option<Answer>;

    fn handle(&mut self, msg: PollAnswer, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.pull_once(&msg.question_id)
    }
}

impl Handler<PollCompositeAnswer> for QuestionHub {
    type Result = Option<Vec<Answer>>;

    fn handle(&mut self, msg: PollCompositeAnswer, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.pull_composite_once(&msg.composite_id)
    }
}

impl Handler<ExpireQuestion> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: ExpireQuestion, _: &mut Self::Context) -> Self::Result {
        let expired = self.dispatcher.expire_question(&msg.question_id);
        if expired {
            tracing::warn!(question_id = %msg.question_id, "Question timed out");
        }
        expired
    }
}

impl Handler<ExpireQuestionnaire> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: ExpireQuestionnaire, _: &mut Self::Context) -> Self::Result {
        let expired = self.dispatcher.expire_questionnaire(&msg.composite_id);
        if expired {
            tracing::warn!(composite_id = %msg.composite_id, "Questionnaire timed out");
        }
        expired
    }
}

impl Handler<ForgetQuestion> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: ForgetQuestion, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.forget_question(&msg.question_id)
    }
}

impl Handler<ForgetQuestionnaire> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: ForgetQuestionnaire, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.forget_questionnaire(&msg.composite_id)
    }
}

impl Handler<ClientAttached> for QuestionHub {
    type Result = usize;

    fn handle(&mut self, msg: ClientAttached, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.client_attached(&msg.client_id)
    }
}

impl Handler<ClientReady> for QuestionHub {
    type Result = usize;

    fn handle(&mut self, msg: ClientReady, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.client_ready(&msg.client_id)
    }
}

impl Handler<RemoteSurface> for QuestionHub {
    type Result = usize;

    fn handle(&mut self, msg: RemoteSurface, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.register_forwarded(msg.0)
    }
}

impl Handler<RemoteCancel> for QuestionHub {
    type Result = bool;

    fn handle(&mut self, msg: RemoteCancel, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.retract_forwarded(msg.0)
    }
}

impl Handler<PendingCount> for QuestionHub {
    type Result = usize;

    fn handle(&mut self, _: PendingCount, _: &mut Self::Context) -> Self::Result {
        self.dispatcher.pending_count()
    }
}
