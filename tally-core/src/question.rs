//! Question types and their per-variant specification rules.
//!
//! On the wire a question is `{id, type, text, specification}` where the shape
//! of `specification` depends on `type`. In memory the pair is a single
//! [`QuestionSpec`] sum type so a specification can never disagree with its
//! question type.

use crate::{EntityId, ValidationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_TEXTBOX_MAX_LENGTH: i64 = 100;
pub const TEXTBOX_MAX_LENGTH_CEILING: i64 = 250;
pub const MIN_CHOICE_OPTIONS: usize = 2;
pub const MAX_CHOICE_OPTIONS: usize = 20;
pub const DEFAULT_LIKERT_MIN: i64 = 1;
pub const DEFAULT_LIKERT_MAX: i64 = 5;

// ============================================================================
// QUESTION KIND
// ============================================================================

/// Discriminant of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionKind {
    Textbox,
    MultipleChoice,
    Likert,
}

impl QuestionKind {
    pub const ALL: [QuestionKind; 3] = [
        QuestionKind::Textbox,
        QuestionKind::MultipleChoice,
        QuestionKind::Likert,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            QuestionKind::Textbox => "TEXTBOX",
            QuestionKind::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionKind::Likert => "LIKERT",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, QuestionKindParseError> {
        match s {
            "TEXTBOX" => Ok(QuestionKind::Textbox),
            "MULTIPLE_CHOICE" => Ok(QuestionKind::MultipleChoice),
            "LIKERT" => Ok(QuestionKind::Likert),
            _ => Err(QuestionKindParseError(s.to_string())),
        }
    }

    /// Answers to these kinds are counted rather than quoted when summarized.
    pub fn is_aggregated(&self) -> bool {
        matches!(self, QuestionKind::MultipleChoice | QuestionKind::Likert)
    }
}

impl fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for QuestionKind {
    type Err = QuestionKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

/// Error when parsing an invalid question type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionKindParseError(pub String);

impl fmt::Display for QuestionKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid question type: {}", self.0)
    }
}

impl std::error::Error for QuestionKindParseError {}

// ============================================================================
// SPECIFICATIONS
// ============================================================================

fn default_max_length() -> i64 {
    DEFAULT_TEXTBOX_MAX_LENGTH
}

fn default_likert_min() -> i64 {
    DEFAULT_LIKERT_MIN
}

fn default_likert_max() -> i64 {
    DEFAULT_LIKERT_MAX
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(deny_unknown_fields)]
pub struct TextboxSpec {
    #[serde(default = "default_max_length")]
    pub max_length: i64,
}

impl Default for TextboxSpec {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_TEXTBOX_MAX_LENGTH,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(deny_unknown_fields)]
pub struct MultipleChoiceSpec {
    #[serde(default)]
    pub options: Vec<String>,
}

/// Likert scale bounds. Labels are presentational only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(deny_unknown_fields)]
pub struct LikertSpec {
    #[serde(default = "default_likert_min")]
    pub min: i64,
    #[serde(default = "default_likert_max")]
    pub max: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_label: Option<String>,
}

impl Default for LikertSpec {
    fn default() -> Self {
        Self {
            min: DEFAULT_LIKERT_MIN,
            max: DEFAULT_LIKERT_MAX,
            min_label: None,
            max_label: None,
        }
    }
}

impl LikertSpec {
    /// Every integer on the scale, ascending.
    pub fn points(&self) -> impl Iterator<Item = i64> {
        self.min..=self.max
    }

    /// The scale point `answer` names. "4", "04" and "+4" all name 4.
    pub fn value_of(&self, answer: &str) -> Option<i64> {
        answer
            .parse::<i64>()
            .ok()
            .filter(|value| (self.min..=self.max).contains(value))
    }
}

/// Type-specific specification of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionSpec {
    Textbox(TextboxSpec),
    MultipleChoice(MultipleChoiceSpec),
    Likert(LikertSpec),
}

impl QuestionSpec {
    /// The defaults a question gets when its type is chosen or changed.
    pub fn default_for(kind: QuestionKind) -> Self {
        match kind {
            QuestionKind::Textbox => QuestionSpec::Textbox(TextboxSpec::default()),
            QuestionKind::MultipleChoice => {
                QuestionSpec::MultipleChoice(MultipleChoiceSpec::default())
            }
            QuestionKind::Likert => QuestionSpec::Likert(LikertSpec::default()),
        }
    }

    pub fn kind(&self) -> QuestionKind {
        match self {
            QuestionSpec::Textbox(_) => QuestionKind::Textbox,
            QuestionSpec::MultipleChoice(_) => QuestionKind::MultipleChoice,
            QuestionSpec::Likert(_) => QuestionKind::Likert,
        }
    }

    /// Read a specification payload for the given kind.
    ///
    /// A missing or `null` payload yields the kind's defaults; missing fields
    /// inside a payload are defaulted individually. Fields that belong to a
    /// different kind are rejected.
    pub fn from_value(kind: QuestionKind, value: Option<Value>) -> Result<Self, ValidationError> {
        let value = match value {
            None | Some(Value::Null) => return Ok(Self::default_for(kind)),
            Some(value) => value,
        };

        let mismatch = |err: serde_json::Error| ValidationError::SpecificationMismatch {
            kind: kind.to_string(),
            reason: err.to_string(),
        };

        match kind {
            QuestionKind::Textbox => serde_json::from_value(value)
                .map(QuestionSpec::Textbox)
                .map_err(mismatch),
            QuestionKind::MultipleChoice => serde_json::from_value(value)
                .map(QuestionSpec::MultipleChoice)
                .map_err(mismatch),
            QuestionKind::Likert => serde_json::from_value(value)
                .map(QuestionSpec::Likert)
                .map_err(mismatch),
        }
    }

    pub fn to_value(&self) -> Value {
        let value = match self {
            QuestionSpec::Textbox(spec) => serde_json::to_value(spec),
            QuestionSpec::MultipleChoice(spec) => serde_json::to_value(spec),
            QuestionSpec::Likert(spec) => serde_json::to_value(spec),
        };
        // Plain structs of integers and strings always serialize.
        value.unwrap_or(Value::Null)
    }

    /// Check the shape constraints of the specification itself.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            QuestionSpec::Textbox(spec) => {
                if spec.max_length <= 0 || spec.max_length > TEXTBOX_MAX_LENGTH_CEILING {
                    return Err(ValidationError::invalid(
                        "max_length",
                        format!("must be between 1 and {}", TEXTBOX_MAX_LENGTH_CEILING),
                    ));
                }
            }
            QuestionSpec::MultipleChoice(spec) => {
                let count = spec.options.len();
                if !(MIN_CHOICE_OPTIONS..=MAX_CHOICE_OPTIONS).contains(&count) {
                    return Err(ValidationError::invalid(
                        "options",
                        format!(
                            "must contain between {} and {} options",
                            MIN_CHOICE_OPTIONS, MAX_CHOICE_OPTIONS
                        ),
                    ));
                }
                let mut seen = HashSet::with_capacity(count);
                for option in &spec.options {
                    if option.trim().is_empty() {
                        return Err(ValidationError::invalid("options", "must not be empty"));
                    }
                    if !seen.insert(option.as_str()) {
                        return Err(ValidationError::invalid(
                            "options",
                            format!("duplicate option '{}'", option),
                        ));
                    }
                }
            }
            QuestionSpec::Likert(spec) => {
                if spec.max <= spec.min {
                    return Err(ValidationError::invalid("max", "must be greater than min"));
                }
            }
        }
        Ok(())
    }

    /// Whether `answer` satisfies this specification.
    pub fn accepts(&self, answer: &str) -> bool {
        match self {
            QuestionSpec::Textbox(spec) => {
                i64::try_from(answer.chars().count()).is_ok_and(|len| len <= spec.max_length)
            }
            QuestionSpec::MultipleChoice(spec) => spec.options.iter().any(|o| o == answer),
            QuestionSpec::Likert(spec) => spec.value_of(answer).is_some(),
        }
    }

    /// The stored form of an accepted answer. Likert answers are rewritten
    /// as their plain integer so equal points compare equal.
    pub fn canonical_answer(&self, answer: String) -> String {
        match self {
            QuestionSpec::Likert(spec) => spec
                .value_of(&answer)
                .map(|value| value.to_string())
                .unwrap_or(answer),
            QuestionSpec::Textbox(_) | QuestionSpec::MultipleChoice(_) => answer,
        }
    }
}

// ============================================================================
// QUESTIONS
// ============================================================================

/// Wire form shared by persisted questions and drafts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema), schema(as = Question))]
pub struct QuestionWire {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<uuid::Uuid>))]
    pub id: Option<EntityId>,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub text: String,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub specification: Option<Value>,
}

/// A question that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionWire", into = "QuestionWire")]
pub struct QuestionDraft {
    pub text: String,
    pub spec: QuestionSpec,
}

impl QuestionDraft {
    pub fn new(kind: QuestionKind, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spec: QuestionSpec::default_for(kind),
        }
    }

    pub fn with_spec(text: impl Into<String>, spec: QuestionSpec) -> Self {
        Self {
            text: text.into(),
            spec,
        }
    }

    pub fn kind(&self) -> QuestionKind {
        self.spec.kind()
    }

    /// Change the question type. A different type discards the current
    /// specification in favour of the new type's defaults.
    pub fn set_kind(&mut self, kind: QuestionKind) {
        if self.kind() != kind {
            self.spec = QuestionSpec::default_for(kind);
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.text.trim().is_empty() {
            return Err(ValidationError::required("question text"));
        }
        self.spec.validate()
    }

    pub fn into_question(self, id: EntityId) -> Question {
        Question {
            id,
            text: self.text,
            spec: self.spec,
        }
    }
}

impl TryFrom<QuestionWire> for QuestionDraft {
    type Error = ValidationError;

    fn try_from(wire: QuestionWire) -> Result<Self, Self::Error> {
        Ok(Self {
            spec: QuestionSpec::from_value(wire.kind, wire.specification)?,
            text: wire.text,
        })
    }
}

impl From<QuestionDraft> for QuestionWire {
    fn from(draft: QuestionDraft) -> Self {
        Self {
            id: None,
            kind: draft.spec.kind(),
            specification: Some(draft.spec.to_value()),
            text: draft.text,
        }
    }
}

/// A persisted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "QuestionWire", into = "QuestionWire")]
pub struct Question {
    pub id: EntityId,
    pub text: String,
    pub spec: QuestionSpec,
}

impl Question {
    pub fn kind(&self) -> QuestionKind {
        self.spec.kind()
    }

    pub fn accepts(&self, answer: &str) -> bool {
        self.spec.accepts(answer)
    }
}

impl TryFrom<QuestionWire> for Question {
    type Error = ValidationError;

    fn try_from(wire: QuestionWire) -> Result<Self, Self::Error> {
        let id = wire.id.ok_or_else(|| ValidationError::required("question id"))?;
        Ok(Self {
            id,
            spec: QuestionSpec::from_value(wire.kind, wire.specification)?,
            text: wire.text,
        })
    }
}

impl From<Question> for QuestionWire {
    fn from(question: Question) -> Self {
        Self {
            id: Some(question.id),
            kind: question.spec.kind(),
            specification: Some(question.spec.to_value()),
            text: question.text,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn choice(options: &[&str]) -> QuestionSpec {
        QuestionSpec::MultipleChoice(MultipleChoiceSpec {
            options: options.iter().map(|o| o.to_string()).collect(),
        })
    }

    #[test]
    fn test_kind_wire_names() {
        for kind in QuestionKind::ALL {
            let encoded = serde_json::to_value(kind).unwrap();
            assert_eq!(encoded, json!(kind.as_db_str()));
            assert_eq!(kind.as_db_str().parse::<QuestionKind>().unwrap(), kind);
        }
        assert!("textbox".parse::<QuestionKind>().is_err());
    }

    #[test]
    fn test_likert_max_only_defaults_min() {
        let spec = QuestionSpec::from_value(QuestionKind::Likert, Some(json!({"max": 5}))).unwrap();
        assert_eq!(
            spec,
            QuestionSpec::Likert(LikertSpec {
                min: 1,
                max: 5,
                min_label: None,
                max_label: None,
            })
        );
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_likert_max_not_above_defaulted_min_is_rejected() {
        let spec = QuestionSpec::from_value(QuestionKind::Likert, Some(json!({"max": 1}))).unwrap();
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_likert_accepts_exactly_its_points() {
        let likert = LikertSpec {
            min: -2,
            max: 2,
            ..LikertSpec::default()
        };
        let points: Vec<i64> = likert.points().collect();
        assert_eq!(points, vec![-2, -1, 0, 1, 2]);

        let spec = QuestionSpec::Likert(likert.clone());
        for point in likert.points() {
            assert!(spec.accepts(&point.to_string()));
        }
        assert!(!spec.accepts("-3"));
        assert!(!spec.accepts("3"));
        assert!(!spec.accepts("1.5"));
        assert!(!spec.accepts(" 1"));
        assert_eq!(spec.canonical_answer("+02".to_string()), "2");
        assert_eq!(spec.canonical_answer("-0".to_string()), "0");
    }

    #[test]
    fn test_missing_specification_uses_defaults() {
        let spec = QuestionSpec::from_value(QuestionKind::Textbox, None).unwrap();
        assert_eq!(spec, QuestionSpec::Textbox(TextboxSpec { max_length: 100 }));

        let spec = QuestionSpec::from_value(QuestionKind::Likert, Some(Value::Null)).unwrap();
        assert_eq!(spec, QuestionSpec::Likert(LikertSpec::default()));
    }

    #[test]
    fn test_specification_from_other_kind_is_rejected() {
        let err = QuestionSpec::from_value(
            QuestionKind::Textbox,
            Some(json!({"options": ["a", "b"]})),
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::SpecificationMismatch { .. }));
    }

    #[test]
    fn test_textbox_bounds() {
        for (max_length, ok) in [(0, false), (1, true), (250, true), (251, false), (-3, false)] {
            let spec = QuestionSpec::Textbox(TextboxSpec { max_length });
            assert_eq!(spec.validate().is_ok(), ok, "max_length {}", max_length);
        }
    }

    #[test]
    fn test_choice_option_rules() {
        assert!(choice(&["yes"]).validate().is_err());
        assert!(choice(&["yes", "no"]).validate().is_ok());
        assert!(choice(&["yes", "yes"]).validate().is_err());
        assert!(choice(&["yes", "  "]).validate().is_err());
        let many: Vec<String> = (0..21).map(|i| format!("option {}", i)).collect();
        let many: Vec<&str> = many.iter().map(String::as_str).collect();
        assert!(choice(&many).validate().is_err());
    }

    #[test]
    fn test_answers_against_specifications() {
        let textbox = QuestionSpec::Textbox(TextboxSpec { max_length: 3 });
        assert!(textbox.accepts("abc"));
        assert!(textbox.accepts("é日本"));
        assert!(!textbox.accepts("abcd"));

        let choice = choice(&["Red", "Blue"]);
        assert!(choice.accepts("Red"));
        assert!(!choice.accepts("red"));
        assert!(!choice.accepts("Red "));

        let likert = QuestionSpec::Likert(LikertSpec::default());
        assert!(likert.accepts("1"));
        assert!(likert.accepts("5"));
        assert!(!likert.accepts("0"));
        assert!(!likert.accepts("6"));
        assert!(!likert.accepts("3.5"));
        assert!(!likert.accepts("three"));
    }

    #[test]
    fn test_set_kind_resets_specification() {
        let mut draft = QuestionDraft::with_spec("Pick one", choice(&["a", "b"]));
        draft.set_kind(QuestionKind::MultipleChoice);
        assert_eq!(draft.spec, choice(&["a", "b"]));

        draft.set_kind(QuestionKind::Likert);
        assert_eq!(draft.spec, QuestionSpec::Likert(LikertSpec::default()));
    }

    #[test]
    fn test_question_wire_shape() {
        let question = QuestionDraft::with_spec("Rate us", QuestionSpec::Likert(LikertSpec::default()))
            .into_question(crate::new_entity_id());
        let encoded = serde_json::to_value(&question).unwrap();
        assert_eq!(encoded["type"], json!("LIKERT"));
        assert_eq!(encoded["text"], json!("Rate us"));
        assert_eq!(encoded["specification"], json!({"min": 1, "max": 5}));
        assert_eq!(encoded["id"], json!(question.id.to_string()));

        let decoded: Question = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, question);
    }

    #[test]
    fn test_persisted_question_requires_id() {
        let result: Result<Question, _> =
            serde_json::from_value(json!({"type": "TEXTBOX", "text": "Why?"}));
        assert!(result.is_err());

        let draft: QuestionDraft =
            serde_json::from_value(json!({"type": "TEXTBOX", "text": "Why?"})).unwrap();
        assert_eq!(draft.kind(), QuestionKind::Textbox);
    }

    #[test]
    fn test_draft_requires_text() {
        let draft = QuestionDraft::new(QuestionKind::Textbox, "   ");
        assert_eq!(
            draft.validate().unwrap_err(),
            ValidationError::required("question text")
        );
    }
}
