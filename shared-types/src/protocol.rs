// Wire messages exchanged between the bridge, UI connections and peer processes

use crate::user_interaction::{Answer, Question, QuestionKind, QuestionOption};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Opaque renderable UI element. The bridge never inspects components after building them.
pub type Component = serde_json::Value;

/// Per-question state carried by a surface so any receiver can render it
/// (and rebuild the question) without access to the asker's process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuestionState {
    pub question_id: String,
    pub kind: QuestionKind,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Declared options, without the synthetic "other" option
    #[serde(default)]
    pub options: Vec<QuestionOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    pub required: bool,
    /// Absolute timeout instant, Unix milliseconds
    pub expires_at: i64,
}

impl QuestionState {
    pub fn from_question(question: &Question, expires_at: i64) -> Self {
        Self {
            question_id: question.id.clone(),
            kind: question.kind,
            title: question.title.clone(),
            message: question.message.clone(),
            description: question.description.clone(),
            options: question.options.clone(),
            default_value: question.default_value.clone(),
            placeholder: question.placeholder.clone(),
            required: question.required,
            expires_at,
        }
    }

    pub fn to_question(&self) -> Question {
        Question {
            id: self.question_id.clone(),
            kind: self.kind,
            title: self.title.clone(),
            message: self.message.clone(),
            description: self.description.clone(),
            options: self.options.clone(),
            default_value: self.default_value.clone(),
            required: self.required,
            placeholder: self.placeholder.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceState {
    /// Set when the surface is a questionnaire answered with `submit-all`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_id: Option<String>,
    pub questions: Vec<QuestionState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SurfaceMessage {
    pub surface_id: String,
    #[ts(type = "Array<unknown>")]
    pub components: Vec<Component>,
    pub initial_state: SurfaceState,
}

impl SurfaceMessage {
    pub fn question_ids(&self) -> impl Iterator<Item = &str> {
        self.initial_state
            .questions
            .iter()
            .map(|q| q.question_id.as_str())
    }
}

/// Tells attached UIs to retract a surface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CancelNotice {
    pub surface_id: String,
    pub question_id: String,
}

/// Messages sent from the bridge to UI connections, and forwarded between processes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Surface(SurfaceMessage),
    Cancel(CancelNotice),
    Connected { client_id: String },
    Error { message: String },
    Pong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum ActionId {
    Confirm,
    Cancel,
    Select,
    Toggle,
    Submit,
    InputChange,
    SubmitAll,
    /// Any action string this version does not recognize
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ActionParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
}

/// A UI-originated event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ActionMessage {
    pub action_id: ActionId,
    #[serde(default)]
    pub surface_id: String,
    #[serde(default)]
    pub parameters: ActionParameters,
}

impl ActionMessage {
    pub fn new(action_id: ActionId, parameters: ActionParameters) -> Self {
        Self {
            action_id,
            surface_id: String::new(),
            parameters,
        }
    }

    pub fn confirm(question_id: &str) -> Self {
        Self::new(ActionId::Confirm, ActionParameters::question(question_id))
    }

    pub fn cancel(question_id: &str) -> Self {
        Self::new(ActionId::Cancel, ActionParameters::question(question_id))
    }

    pub fn select(question_id: &str, value: &str) -> Self {
        Self::new(
            ActionId::Select,
            ActionParameters::question(question_id).with_value(value),
        )
    }

    pub fn toggle(question_id: &str, value: &str, checked: bool) -> Self {
        let mut parameters = ActionParameters::question(question_id).with_value(value);
        parameters.checked = Some(checked);
        Self::new(ActionId::Toggle, parameters)
    }

    pub fn input_change(question_id: &str, value: &str) -> Self {
        Self::new(
            ActionId::InputChange,
            ActionParameters::question(question_id).with_value(value),
        )
    }

    pub fn submit(question_id: &str) -> Self {
        Self::new(ActionId::Submit, ActionParameters::question(question_id))
    }

    pub fn submit_all(composite_id: &str, question_ids: &[&str]) -> Self {
        Self::new(
            ActionId::SubmitAll,
            ActionParameters {
                composite_id: Some(composite_id.to_string()),
                question_ids: Some(question_ids.iter().map(|id| id.to_string()).collect()),
                ..Default::default()
            },
        )
    }

    pub fn cancel_all(composite_id: &str) -> Self {
        Self::new(
            ActionId::Cancel,
            ActionParameters {
                composite_id: Some(composite_id.to_string()),
                ..Default::default()
            },
        )
    }

    pub fn with_surface(mut self, surface_id: impl Into<String>) -> Self {
        self.surface_id = surface_id.into();
        self
    }
}

impl ActionParameters {
    pub fn question(question_id: &str) -> Self {
        Self {
            question_id: Some(question_id.to_string()),
            ..Default::default()
        }
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }
}

/// Everything a UI connection may send to the bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Action(ActionMessage),
    /// The UI has (re)connected and wants every open question again
    Ready,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionRequest {
    pub question: Question,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AskQuestionnaireRequest {
    /// Generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composite_id: Option<String>,
    pub questions: Vec<Question>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireAnswers {
    pub composite_id: String,
    pub answers: Vec<Answer>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
pub struct ActionResponse {
    pub handled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct ForwardAccepted {
    pub surface_id: String,
    pub rebroadcast: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime: u64,
    pub pending_questions: usize,
}
