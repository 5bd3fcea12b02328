pub mod protocol;
pub mod typescript_gen;
pub mod user_interaction;

pub use typescript_gen::generate_typescript_definitions;

pub use protocol::{
    ActionId, ActionMessage, ActionParameters, ActionResponse, AskQuestionRequest,
    AskQuestionnaireRequest, CancelNotice, Component, ForwardAccepted, HealthResponse,
    InboundMessage, OutboundMessage, QuestionState, QuestionnaireAnswers, SurfaceMessage,
    SurfaceState,
};
pub use user_interaction::{
    Answer, AnswerValue, Question, QuestionKind, QuestionOption, OTHER_OPTION_LABEL,
    OTHER_OPTION_VALUE,
};
