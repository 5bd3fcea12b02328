//! Turns questions into renderable surfaces.
//!
//! Components are plain JSON handed to the UI untouched; every interactive
//! element carries the action (and its parameters) the UI should send back.

use serde_json::{json, Value};
use shared_types::{
    Component, Question, QuestionKind, QuestionState, SurfaceMessage, SurfaceState,
    OTHER_OPTION_VALUE,
};

pub fn new_surface_id() -> String {
    format!("surface-{}", uuid::Uuid::new_v4())
}

/// Surface for a single question, ending with its terminal controls
pub fn build_surface(surface_id: &str, question: &Question, expires_at: i64) -> SurfaceMessage {
    let mut components = header_components(question);
    components.extend(input_components(question));

    match question.kind {
        QuestionKind::Confirm => {
            components.push(button(
                &format!("{}-confirm", question.id),
                "Confirm",
                "confirm",
                json!({ "questionId": question.id }),
            ));
        }
        _ => {
            components.push(button(
                &format!("{}-submit", question.id),
                "Submit",
                "submit",
                json!({ "questionId": question.id }),
            ));
        }
    }
    components.push(button(
        &format!("{}-cancel", question.id),
        "Cancel",
        "cancel",
        json!({ "questionId": question.id }),
    ));

    SurfaceMessage {
        surface_id: surface_id.to_string(),
        components,
        initial_state: SurfaceState {
            composite_id: None,
            questions: vec![QuestionState::from_question(question, expires_at)],
        },
    }
}

/// One surface for several related questions, answered together with `submit-all`
pub fn build_questionnaire_surface(
    surface_id: &str,
    composite_id: &str,
    questions: &[Question],
    expires_at: i64,
) -> SurfaceMessage {
    let mut components = Vec::new();
    for question in questions {
        components.extend(header_components(question));
        components.extend(input_components(question));
    }

    let question_ids: Vec<&str> = questions.iter().map(|q| q.id.as_str()).collect();
    components.push(button(
        &format!("{composite_id}-submit-all"),
        "Submit",
        "submit-all",
        json!({ "compositeId": composite_id, "questionIds": question_ids }),
    ));
    components.push(button(
        &format!("{composite_id}-cancel"),
        "Cancel",
        "cancel",
        json!({ "compositeId": composite_id }),
    ));

    SurfaceMessage {
        surface_id: surface_id.to_string(),
        components,
        initial_state: SurfaceState {
            composite_id: Some(composite_id.to_string()),
            questions: questions
                .iter()
                .map(|q| QuestionState::from_question(q, expires_at))
                .collect(),
        },
    }
}

fn header_components(question: &Question) -> Vec<Component> {
    let mut components = vec![json!({
        "type": "heading",
        "id": format!("{}-title", question.id),
        "text": question.title,
        "required": question.required,
    })];
    for (suffix, text) in [
        ("message", &question.message),
        ("description", &question.description),
    ] {
        if let Some(text) = text {
            components.push(json!({
                "type": "text",
                "id": format!("{}-{}", question.id, suffix),
                "text": text,
            }));
        }
    }
    components
}

fn input_components(question: &Question) -> Vec<Component> {
    let params = json!({ "questionId": question.id });

    match question.kind {
        QuestionKind::Confirm => Vec::new(),
        QuestionKind::Select | QuestionKind::MultiSelect => {
            let (element, action) = if question.kind == QuestionKind::Select {
                ("radio-group", "select")
            } else {
                ("checkbox-group", "toggle")
            };
            let options: Vec<Value> = question
                .options_with_other()
                .iter()
                .map(|option| {
                    json!({
                        "value": option.value,
                        "label": option.label,
                        "description": option.description,
                    })
                })
                .collect();

            vec![
                json!({
                    "type": element,
                    "id": format!("{}-options", question.id),
                    "options": options,
                    "defaultValue": question.default_value,
                    "action": { "actionId": action, "parameters": params },
                }),
                json!({
                    "type": "text-field",
                    "id": format!("{}-other", question.id),
                    "placeholder": "Type your own answer",
                    "visibleWhen": { "selected": OTHER_OPTION_VALUE },
                    "action": { "actionId": "input-change", "parameters": params },
                }),
            ]
        }
        QuestionKind::Input => vec![json!({
            "type": "text-field",
            "id": format!("{}-input", question.id),
            "placeholder": question.placeholder,
            "defaultValue": question.default_value,
            "action": { "actionId": "input-change", "parameters": params },
        })],
    }
}

fn button(id: &str, label: &str, action_id: &str, parameters: Value) -> Component {
    json!({
        "type": "button",
        "id": id,
        "label": label,
        "action": { "actionId": action_id, "parameters": parameters },
    })
}
