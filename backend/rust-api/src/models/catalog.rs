use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

/// Exercise as stored in the "exercises" collection. The solution shape depends on `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub part_id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub solution: Value,
    #[serde(default)]
    pub exp_reward: i64,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// Part as stored in the "parts" collection. Completion is never stored here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Part {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub section_id: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub exp_reward: i64,
}

#[derive(Debug, Clone)]
pub struct Exercise {
    pub id: String,
    pub part_id: String,
    pub exp_reward: i64,
    pub is_active: bool,
    pub kind: ExerciseKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExerciseKind {
    MultipleChoice(MultipleChoiceSolution),
    FillBlank(FillBlankSolution),
    CodeTest(CodeTestSolution),
    /// Any other type tag: plain comparison against `correct_answer`.
    Literal(LiteralSolution),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MultipleChoiceSolution {
    #[serde(default)]
    pub correct_answer: Option<Value>,
    #[serde(default)]
    pub options: Vec<ChoiceOption>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChoiceOption {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub text: Option<Value>,
    #[serde(default)]
    pub correct: Option<Value>,
}

impl ChoiceOption {
    /// Only a literal boolean `true` marks the option as the answer.
    pub fn is_marked_correct(&self) -> bool {
        matches!(self.correct, Some(Value::Bool(true)))
    }

    pub fn answer_text(&self) -> String {
        self.text
            .as_ref()
            .or(self.id.as_ref())
            .map(value_text)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FillBlankSolution {
    #[serde(default)]
    pub expected_answers: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CodeTestSolution {
    #[serde(default)]
    pub expected_output: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LiteralSolution {
    #[serde(default)]
    pub correct_answer: Option<Value>,
}

impl ExerciseKind {
    pub fn from_raw(kind: &str, solution: &Value) -> Self {
        match kind {
            "multiple_choice" => ExerciseKind::MultipleChoice(parse_solution(kind, solution)),
            "fill_blank" => ExerciseKind::FillBlank(parse_solution(kind, solution)),
            "code_test" => ExerciseKind::CodeTest(parse_solution(kind, solution)),
            _ => ExerciseKind::Literal(parse_solution(kind, solution)),
        }
    }
}

fn parse_solution<T: DeserializeOwned + Default>(kind: &str, solution: &Value) -> T {
    if solution.is_null() {
        return T::default();
    }
    serde_json::from_value(solution.clone()).unwrap_or_else(|err| {
        tracing::warn!(
            "Malformed solution for exercise type {}, grading against an empty solution: {}",
            kind,
            err
        );
        T::default()
    })
}

impl From<ExerciseDocument> for Exercise {
    fn from(doc: ExerciseDocument) -> Self {
        let kind = ExerciseKind::from_raw(&doc.kind, &doc.solution);
        Exercise {
            id: doc.id,
            part_id: doc.part_id,
            exp_reward: doc.exp_reward.max(0),
            is_active: doc.is_active,
            kind,
        }
    }
}

/// Text form of a loosely typed solution value (strings as-is, numbers printed).
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(true) => "1".to_string(),
        Value::Bool(false) => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

pub fn value_as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

/// Numeric values compare by value ("2" == 2), everything else by text.
pub fn loosely_equal(left: &Value, right: &Value) -> bool {
    match (value_as_number(left), value_as_number(right)) {
        (Some(a), Some(b)) => a == b,
        _ => value_text(left) == value_text(right),
    }
}
