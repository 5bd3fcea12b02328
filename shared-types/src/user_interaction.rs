// Question and answer types shared between the bridge, askers and UI clients

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use ts_rs::TS;

/// Value of the synthetic "let me type my own answer" option
pub const OTHER_OPTION_VALUE: &str = "__other__";

/// Label shown for the synthetic "other" option
pub const OTHER_OPTION_LABEL: &str = "Other";

/// Kind of question and the shape of its answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionKind {
    /// Yes/no question answered with a boolean
    Confirm,
    /// Single choice from the options
    Select,
    /// Any number of choices from the options
    MultiSelect,
    /// Free text
    Input,
}

impl QuestionKind {
    /// Whether this kind presents options (and therefore the "other" option)
    pub fn has_options(&self) -> bool {
        matches!(self, QuestionKind::Select | QuestionKind::MultiSelect)
    }
}

/// One selectable option of a question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl QuestionOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// The synthetic option that lets the user type their own answer
    pub fn other() -> Self {
        Self::new(OTHER_OPTION_VALUE, OTHER_OPTION_LABEL)
    }

    pub fn is_other(&self) -> bool {
        self.value == OTHER_OPTION_VALUE
    }
}

/// A question asked by an automation process. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Unique identifier for this question
    pub id: String,
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
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl Question {
    fn new(id: impl Into<String>, kind: QuestionKind, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            title: title.into(),
            message: None,
            description: None,
            options: Vec::new(),
            default_value: None,
            required: false,
            placeholder: None,
        }
    }

    pub fn confirm(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, QuestionKind::Confirm, title)
    }

    pub fn select(
        id: impl Into<String>,
        title: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> Self {
        Self::new(id, QuestionKind::Select, title).with_options(options)
    }

    pub fn multi_select(
        id: impl Into<String>,
        title: impl Into<String>,
        options: Vec<QuestionOption>,
    ) -> Self {
        Self::new(id, QuestionKind::MultiSelect, title).with_options(options)
    }

    pub fn input(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(id, QuestionKind::Input, title)
    }

    pub fn with_options(mut self, options: Vec<QuestionOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = Some(default_value.into());
        self
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = Some(placeholder.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Declared options followed by the synthetic "other" option for select kinds
    pub fn options_with_other(&self) -> Vec<QuestionOption> {
        let mut options = self.options.clone();
        if self.kind.has_options() {
            options.push(QuestionOption::other());
        }
        options
    }

    /// Validate the question structure
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("Question has empty ID".to_string());
        }

        if self.title.trim().is_empty() {
            return Err(format!("Question '{}' has empty title", self.id));
        }

        if self.kind.has_options() && self.options.is_empty() {
            return Err(format!(
                "Question '{}' of kind {:?} requires at least one option",
                self.id, self.kind
            ));
        }

        let mut values = HashSet::new();
        for option in &self.options {
            if option.is_other() {
                return Err(format!(
                    "Question '{}' uses the reserved option value '{}'",
                    self.id, OTHER_OPTION_VALUE
                ));
            }
            if !values.insert(option.value.as_str()) {
                return Err(format!(
                    "Question '{}' has duplicate option value: {}",
                    self.id, option.value
                ));
            }
        }

        Ok(())
    }
}

/// Resolved value of an answer; the shape depends on the question kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(untagged)]
pub enum AnswerValue {
    Bool(bool),
    Text(String),
    List(Vec<String>),
    /// No answer was given
    None,
}

impl AnswerValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnswerValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AnswerValue::List(values) => Some(values),
            _ => None,
        }
    }
}

/// Terminal result of a question. Produced exactly once per question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub value: AnswerValue,
    pub cancelled: bool,
}

impl Answer {
    pub fn answered(question_id: impl Into<String>, value: AnswerValue) -> Self {
        Self {
            question_id: question_id.into(),
            value,
            cancelled: false,
        }
    }

    /// The "no answer" result for a question: `false` for confirm, `None` otherwise
    pub fn cancelled_for(question: &Question) -> Self {
        let value = match question.kind {
            QuestionKind::Confirm => AnswerValue::Bool(false),
            _ => AnswerValue::None,
        };
        Self {
            question_id: question.id.clone(),
            value,
            cancelled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Vec<QuestionOption> {
        vec![
            QuestionOption::new("red", "Red"),
            QuestionOption::new("blue", "Blue").with_description("The calm one"),
        ]
    }

    #[test]
    fn test_question_validation() {
        assert!(Question::select("color", "Pick a color", colors())
            .validate()
            .is_ok());
        assert!(Question::confirm("go", "Proceed?").validate().is_ok());
        assert!(Question::input("name", "Your name").validate().is_ok());

        assert!(Question::input("", "No id").validate().is_err());
        assert!(Question::input("blank", "   ").validate().is_err());
        assert!(Question::select("empty", "No options", vec![])
            .validate()
            .is_err());
    }

    #[test]
    fn test_question_rejects_duplicate_and_reserved_values() {
        let duplicate = Question::multi_select(
            "dup",
            "Duplicates",
            vec![QuestionOption::new("a", "A"), QuestionOption::new("a", "A again")],
        );
        assert!(duplicate.validate().is_err());

        let reserved = Question::select(
            "reserved",
            "Reserved",
            vec![QuestionOption::new(OTHER_OPTION_VALUE, "Sneaky")],
        );
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn test_options_with_other() {
        let select = Question::select("color", "Pick a color", colors());
        let options = select.options_with_other();
        assert_eq!(options.len(), 3);
        assert!(options.last().unwrap().is_other());

        let input = Question::input("name", "Your name");
        assert!(input.options_with_other().is_empty());
    }

    #[test]
    fn test_cancelled_answer_shape() {
        let confirm = Question::confirm("go", "Proceed?");
        let answer = Answer::cancelled_for(&confirm);
        assert_eq!(answer.value, AnswerValue::Bool(false));
        assert!(answer.cancelled);

        let select = Question::select("color", "Pick a color", colors());
        assert_eq!(Answer::cancelled_for(&select).value, AnswerValue::None);
    }

    #[test]
    fn test_wire_format() {
        let question = Question::multi_select("langs", "Languages", colors()).required();
        let json = serde_json::to_value(&question).unwrap();
        assert_eq!(json["kind"], "multi-select");
        assert_eq!(json["required"], true);
        assert!(json.get("defaultValue").is_none());

        let answer = Answer::answered("langs", AnswerValue::List(vec!["red".to_string()]));
        let json = serde_json::to_value(&answer).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"questionId": "langs", "value": ["red"], "cancelled": false})
        );

        let parsed: Answer = serde_json::from_value(serde_json::json!({
            "questionId": "go",
            "value": null,
            "cancelled": true
        }))
        .unwrap();
        assert_eq!(parsed.value, AnswerValue::None);
    }
}
