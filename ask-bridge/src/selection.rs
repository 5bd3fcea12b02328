//! In-progress answer state for questions that are still open.
//!
//! UI events (`select`, `toggle`, `input-change`) arrive one at a time and
//! mutate the entry for their question; `submit`/`submit-all` read and clear
//! it in one step. Nothing here performs I/O.

use shared_types::{AnswerValue, Question, QuestionKind, OTHER_OPTION_VALUE};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Chosen value of a `select` question; empty until something is chosen
    Single(String),
    /// Chosen values of a `multi-select` question, in the order they were checked
    Multi(Vec<String>),
    /// Primary text of an `input` question
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Select(String),
    Toggle { value: String, checked: bool },
    Text(String),
    /// Free text standing in for the synthetic "other" option
    OtherText(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionEntry {
    pub selection: Option<Selection>,
    pub other_text: Option<String>,
}

impl SelectionEntry {
    fn apply(&mut self, mutation: Mutation) {
        match mutation {
            Mutation::Select(value) => self.selection = Some(Selection::Single(value)),
            Mutation::Toggle { value, checked } => {
                if !matches!(self.selection, Some(Selection::Multi(_))) {
                    self.selection = Some(Selection::Multi(Vec::new()));
                }
                if let Some(Selection::Multi(values)) = &mut self.selection {
                    let present = values.iter().position(|v| *v == value);
                    match (checked, present) {
                        (true, None) => values.push(value),
                        (false, Some(index)) => {
                            values.remove(index);
                        }
                        _ => {}
                    }
                }
            }
            Mutation::Text(text) => self.selection = Some(Selection::Text(text)),
            Mutation::OtherText(text) => self.other_text = Some(text),
        }
    }

    /// Substitute the "other" marker with the typed text. An "other" choice
    /// without text resolves to nothing rather than to the marker.
    fn resolve_other(&self, value: String) -> Option<String> {
        if value == OTHER_OPTION_VALUE {
            self.other_text.clone().filter(|text| !text.is_empty())
        } else {
            Some(value)
        }
    }
}

/// Final answer value for a question from whatever state was recorded.
///
/// `question` is `None` when the question is not known to this process; the
/// value then follows whichever state is populated, defaulting to `""`.
pub fn resolve_value(entry: Option<SelectionEntry>, question: Option<&Question>) -> AnswerValue {
    let entry = entry.unwrap_or_default();
    let kind = question.map(|q| q.kind);

    match entry.selection.clone() {
        Some(Selection::Single(value)) => {
            AnswerValue::Text(entry.resolve_other(value).unwrap_or_default())
        }
        Some(Selection::Multi(values)) => AnswerValue::List(
            values
                .into_iter()
                .filter_map(|value| entry.resolve_other(value))
                .collect(),
        ),
        Some(Selection::Text(text)) => AnswerValue::Text(text),
        None => match kind {
            Some(QuestionKind::MultiSelect) => AnswerValue::List(Vec::new()),
            Some(QuestionKind::Input) => AnswerValue::Text(
                question
                    .and_then(|q| q.default_value.clone())
                    .unwrap_or_default(),
            ),
            _ => AnswerValue::Text(String::new()),
        },
    }
}

#[derive(Debug, Default)]
pub struct SelectionStore {
    entries: HashMap<String, SelectionEntry>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn init_single(&mut self, question_id: &str) {
        self.entries.insert(
            question_id.to_string(),
            SelectionEntry {
                selection: Some(Selection::Single(String::new())),
                other_text: None,
            },
        );
    }

    pub fn init_multi(&mut self, question_id: &str) {
        self.entries.insert(
            question_id.to_string(),
            SelectionEntry {
                selection: Some(Selection::Multi(Vec::new())),
                other_text: None,
            },
        );
    }

    /// Apply one incremental UI event. Entries for `input` questions are created lazily.
    pub fn apply(&mut self, question_id: &str, mutation: Mutation) {
        self.entries
            .entry(question_id.to_string())
            .or_default()
            .apply(mutation);
    }

    /// Read and clear the entry for a question
    pub fn take(&mut self, question_id: &str) -> Option<SelectionEntry> {
        self.entries.remove(question_id)
    }

    pub fn get(&self, question_id: &str) -> Option<&SelectionEntry> {
        self.entries.get(question_id)
    }

    pub fn contains(&self, question_id: &str) -> bool {
        self.entries.contains_key(question_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_types::QuestionOption;

    fn multi() -> Question {
        Question::multi_select(
            "q",
            "Pick",
            vec![
                QuestionOption::new("a", "A"),
                QuestionOption::new("b", "B"),
                QuestionOption::new("c", "C"),
            ],
        )
    }

    fn toggle(value: &str, checked: bool) -> Mutation {
        Mutation::Toggle {
            value: value.to_string(),
            checked,
        }
    }

    #[test]
    fn test_select_last_write_wins() {
        let mut store = SelectionStore::new();
        store.init_single("q");
        store.apply("q", Mutation::Select("a".to_string()));
        store.apply("q", Mutation::Select("b".to_string()));

        let value = resolve_value(store.take("q"), None);
        assert_eq!(value, AnswerValue::Text("b".to_string()));
        assert!(!store.contains("q"));
    }

    #[test]
    fn test_toggle_is_idempotent_per_value() {
        let mut store = SelectionStore::new();
        store.init_multi("q");
        store.apply("q", toggle("a", true));
        store.apply("q", toggle("a", true));
        store.apply("q", toggle("b", true));
        store.apply("q", toggle("c", false));

        let value = resolve_value(store.take("q"), Some(&multi()));
        assert_eq!(
            value,
            AnswerValue::List(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_toggle_off_removes_value() {
        let mut store = SelectionStore::new();
        store.init_multi("q");
        store.apply("q", toggle("a", true));
        store.apply("q", toggle("b", true));
        store.apply("q", toggle("a", false));

        let value = resolve_value(store.take("q"), Some(&multi()));
        assert_eq!(value, AnswerValue::List(vec!["b".to_string()]));
    }

    #[test]
    fn test_other_marker_resolves_to_free_text() {
        let mut store = SelectionStore::new();
        store.init_single("q");
        store.apply("q", Mutation::Select(OTHER_OPTION_VALUE.to_string()));
        store.apply("q", Mutation::OtherText("purple".to_string()));

        let value = resolve_value(store.take("q"), None);
        assert_eq!(value, AnswerValue::Text("purple".to_string()));
    }

    #[test]
    fn test_other_marker_without_text_never_leaks() {
        let mut store = SelectionStore::new();
        store.init_multi("q");
        store.apply("q", toggle("a", true));
        store.apply("q", toggle(OTHER_OPTION_VALUE, true));

        let value = resolve_value(store.take("q"), Some(&multi()));
        assert_eq!(value, AnswerValue::List(vec!["a".to_string()]));
    }

    #[test]
    fn test_other_in_multi_select_is_substituted_in_place() {
        let mut store = SelectionStore::new();
        store.init_multi("q");
        store.apply("q", toggle(OTHER_OPTION_VALUE, true));
        store.apply("q", toggle("b", true));
        store.apply("q", Mutation::OtherText("zig".to_string()));

        let value = resolve_value(store.take("q"), Some(&multi()));
        assert_eq!(
            value,
            AnswerValue::List(vec!["zig".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn test_untouched_state_resolves_empty() {
        let mut store = SelectionStore::new();
        store.init_single("single");
        store.init_multi("multi");

        assert_eq!(
            resolve_value(store.take("single"), None),
            AnswerValue::Text(String::new())
        );
        assert_eq!(
            resolve_value(store.take("multi"), Some(&multi())),
            AnswerValue::List(Vec::new())
        );
        assert_eq!(
            resolve_value(None, None),
            AnswerValue::Text(String::new())
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_input_text_and_default() {
        let question = Question::input("name", "Name").with_default("anonymous");
        assert_eq!(
            resolve_value(None, Some(&question)),
            AnswerValue::Text("anonymous".to_string())
        );

        let mut store = SelectionStore::new();
        store.apply("name", Mutation::Text("Ada".to_string()));
        assert_eq!(
            resolve_value(store.take("name"), Some(&question)),
            AnswerValue::Text("Ada".to_string())
        );
    }
}
