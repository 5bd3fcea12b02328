use ts_rs::TS;

/// Every type a UI client needs, in dependency order
pub const API_TYPE_NAMES: &[&str] = &[
    "QuestionKind",
    "QuestionOption",
    "Question",
    "AnswerValue",
    "Answer",
    "QuestionState",
    "SurfaceState",
    "SurfaceMessage",
    "CancelNotice",
    "OutboundMessage",
    "ActionId",
    "ActionParameters",
    "ActionMessage",
    "InboundMessage",
    "AskQuestionRequest",
    "AskQuestionnaireRequest",
    "QuestionnaireAnswers",
    "ActionResponse",
    "ForwardAccepted",
    "HealthResponse",
];

pub fn generate_typescript_definitions(
    type_names: &[&str],
) -> Result<String, Box<dyn std::error::Error>> {
    if type_names.is_empty() {
        return Err("No type names provided".into());
    }

    let mut definitions = Vec::new();

    for name in type_names {
        let type_def = export_type(name)?;
        let cleaned = clean_type(type_def);

        if !cleaned.trim().is_empty() {
            definitions.push(cleaned);
        }
    }

    Ok(definitions.join("\n\n"))
}

fn export_type(name: &str) -> Result<String, Box<dyn std::error::Error>> {
    use crate::*;

    let result = match name {
        "QuestionKind" => QuestionKind::export_to_string()?,
        "QuestionOption" => QuestionOption::export_to_string()?,
        "Question" => Question::export_to_string()?,
        "AnswerValue" => AnswerValue::export_to_string()?,
        "Answer" => Answer::export_to_string()?,

        "QuestionState" => QuestionState::export_to_string()?,
        "SurfaceState" => SurfaceState::export_to_string()?,
        "SurfaceMessage" => SurfaceMessage::export_to_string()?,
        "CancelNotice" => CancelNotice::export_to_string()?,
        "OutboundMessage" => OutboundMessage::export_to_string()?,
        "ActionId" => ActionId::export_to_string()?,
        "ActionParameters" => ActionParameters::export_to_string()?,
        "ActionMessage" => ActionMessage::export_to_string()?,
        "InboundMessage" => InboundMessage::export_to_string()?,

        "AskQuestionRequest" => AskQuestionRequest::export_to_string()?,
        "AskQuestionnaireRequest" => AskQuestionnaireRequest::export_to_string()?,
        "QuestionnaireAnswers" => QuestionnaireAnswers::export_to_string()?,
        "ActionResponse" => ActionResponse::export_to_string()?,
        "ForwardAccepted" => ForwardAccepted::export_to_string()?,
        "HealthResponse" => HealthResponse::export_to_string()?,

        _ => {
            return Err(format!(
                "Unknown type: '{}'. Available types can be found in shared-types/src/",
                name
            )
            .into());
        }
    };

    Ok(result)
}

fn clean_type(mut type_def: String) -> String {
    type_def.retain(|c| c != '\r');

    let lines: Vec<&str> = type_def.lines().collect();

    let filtered: Vec<&str> = lines
        .iter()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.starts_with("import type")
                && !trimmed.starts_with("// This file was generated")
        })
        .cloned()
        .collect();

    filtered.join("\n").trim().to_string()
}
