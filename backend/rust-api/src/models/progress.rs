use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};

use super::user::bson_datetime_as_chrono;

/// Identity of a ledger row. Exercise-level and part-level rows share one collection
/// and are told apart by the presence of `exercise_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RecordKey {
    Exercise { user_id: String, exercise_id: String },
    Part { user_id: String, part_id: String },
}

impl RecordKey {
    pub fn exercise(user_id: &str, exercise_id: &str) -> Self {
        RecordKey::Exercise {
            user_id: user_id.to_string(),
            exercise_id: exercise_id.to_string(),
        }
    }

    pub fn part(user_id: &str, part_id: &str) -> Self {
        RecordKey::Part {
            user_id: user_id.to_string(),
            part_id: part_id.to_string(),
        }
    }

    pub fn id(&self) -> String {
        match self {
            RecordKey::Exercise {
                user_id,
                exercise_id,
            } => format!("{}:exercise:{}", user_id, exercise_id),
            RecordKey::Part { user_id, part_id } => format!("{}:part:{}", user_id, part_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLevel {
    Exercise,
    Part,
}

/// Ledger row stored in the "user_progress" collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AttemptRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub exercise_id: Option<String>,
    pub part_id: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub user_answer: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub exp_earned: i64,
    #[serde(default)]
    pub attempts: i64,
    /// Set once the exercise reward (or part bonus) has been credited. Never cleared.
    #[serde(default)]
    pub reward_claimed: bool,
    #[serde(with = "bson_datetime_as_chrono")]
    pub completed_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn part_completion(
        user_id: &str,
        part_id: &str,
        bonus_exp: i64,
        at: DateTime<Utc>,
    ) -> Self {
        AttemptRecord {
            id: RecordKey::part(user_id, part_id).id(),
            user_id: user_id.to_string(),
            exercise_id: None,
            part_id: part_id.to_string(),
            completed: true,
            user_answer: None,
            is_correct: true,
            exp_earned: bonus_exp,
            attempts: 0,
            reward_claimed: true,
            completed_at: at,
        }
    }

    pub fn level(&self) -> RecordLevel {
        if self.exercise_id.is_some() {
            RecordLevel::Exercise
        } else {
            RecordLevel::Part
        }
    }
}

/// Values written by one submission; the store owns the attempt counter.
#[derive(Debug, Clone)]
pub struct NewAttempt {
    pub user_id: String,
    pub exercise_id: String,
    pub part_id: String,
    pub user_answer: String,
    pub is_correct: bool,
    pub exp_earned: i64,
    pub submitted_at: DateTime<Utc>,
}

/// Ledger row as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptView {
    pub user_id: String,
    pub exercise_id: Option<String>,
    pub part_id: String,
    pub completed: bool,
    pub user_answer: Option<String>,
    pub is_correct: bool,
    pub exp_earned: i64,
    pub attempts: i64,
    pub completed_at: DateTime<Utc>,
}

impl From<AttemptRecord> for AttemptView {
    fn from(record: AttemptRecord) -> Self {
        AttemptView {
            user_id: record.user_id,
            exercise_id: record.exercise_id,
            part_id: record.part_id,
            completed: record.completed,
            user_answer: record.user_answer,
            is_correct: record.is_correct,
            exp_earned: record.exp_earned,
            attempts: record.attempts,
            completed_at: record.completed_at,
        }
    }
}

/// A submitted answer: either one string (`|` separates blanks) or a list of blanks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmittedAnswer {
    Text(String),
    Segments(Vec<String>),
}

impl SubmittedAnswer {
    /// Raw text stored in the ledger.
    pub fn raw_text(&self) -> String {
        match self {
            SubmittedAnswer::Text(text) => text.clone(),
            SubmittedAnswer::Segments(segments) => segments.join("|"),
        }
    }

    pub fn is_blank(&self) -> bool {
        match self {
            SubmittedAnswer::Text(text) => text.trim().is_empty(),
            SubmittedAnswer::Segments(segments) => segments.iter().all(|s| s.trim().is_empty()),
        }
    }
}

impl From<&str> for SubmittedAnswer {
    fn from(value: &str) -> Self {
        SubmittedAnswer::Text(value.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitExerciseRequest {
    #[serde(deserialize_with = "string_or_number")]
    #[validate(length(min = 1, message = "exercise_id is required"))]
    pub exercise_id: String,

    #[validate(custom(function = "validate_submitted_answer"))]
    pub user_answer: SubmittedAnswer,
}

fn validate_submitted_answer(answer: &SubmittedAnswer) -> Result<(), ValidationError> {
    if answer.is_blank() {
        let mut err = ValidationError::new("blank_answer");
        err.message = Some("user_answer must not be empty".into());
        return Err(err);
    }
    Ok(())
}

/// Accepts ids sent either as JSON strings or as JSON numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResult {
    pub success: bool,
    pub is_correct: bool,
    /// EXP credited for the exercise by this submission.
    pub exp_earned: i64,
    pub part_completed: bool,
    pub part_exp_earned: i64,
    pub total_exp_earned: i64,
    pub user_total_exp: i64,
    pub progress: AttemptView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartEvaluation {
    pub completed: bool,
    pub bonus_exp: i64,
    pub completed_count: u64,
    pub total_count: u64,
}

impl PartEvaluation {
    pub fn incomplete() -> Self {
        PartEvaluation {
            completed: false,
            bonus_exp: 0,
            completed_count: 0,
            total_count: 0,
        }
    }
}

/// Marker attached to a degraded read projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ReadFault {
    #[serde(rename = "Part not found")]
    PartNotFound,
    #[serde(rename = "Server error")]
    ServerError,
    #[serde(rename = "Failed to fetch exercise status")]
    StatusUnavailable,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PartProgress {
    pub part_id: String,
    pub total_exercises: u64,
    pub completed_exercises: u64,
    pub progress_percentage: u64,
    pub part_completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReadFault>,
}

impl PartProgress {
    pub fn empty(part_id: &str) -> Self {
        PartProgress {
            part_id: part_id.to_string(),
            total_exercises: 0,
            completed_exercises: 0,
            progress_percentage: 0,
            part_completed: false,
            error: None,
        }
    }

    pub fn with_fault(mut self, fault: ReadFault) -> Self {
        self.error = Some(fault);
        self
    }
}

pub fn progress_percentage(completed: u64, total: u64) -> u64 {
    if total == 0 {
        return 0;
    }
    ((completed as f64 / total as f64) * 100.0).round() as u64
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Dashboard {
    pub total_exp: i64,
    pub level: i64,
    pub completed_parts: u64,
    pub completed_exercises: u64,
    pub streak: i64,
}

impl Default for Dashboard {
    fn default() -> Self {
        Dashboard {
            total_exp: 0,
            level: 1,
            completed_parts: 0,
            completed_exercises: 0,
            streak: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ExerciseStatus {
    pub completed: bool,
    pub user_answer: Option<String>,
    pub is_correct: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ReadFault>,
}

impl From<Option<AttemptRecord>> for ExerciseStatus {
    fn from(record: Option<AttemptRecord>) -> Self {
        match record {
            Some(record) => ExerciseStatus {
                completed: record.completed,
                user_answer: record.user_answer,
                is_correct: record.is_correct,
                completed_at: Some(record.completed_at),
                error: None,
            },
            None => ExerciseStatus::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardSource {
    Exercise { exercise_id: String, part_id: String },
    PartBonus { part_id: String },
}

impl AwardSource {
    pub fn label(&self) -> &'static str {
        match self {
            AwardSource::Exercise { .. } => "exercise",
            AwardSource::PartBonus { .. } => "part_bonus",
        }
    }
}

/// One committed EXP credit, handed to award observers after the transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpAward {
    pub user_id: String,
    pub source: AwardSource,
    pub exp: i64,
    pub total_before: i64,
    pub total_after: i64,
    pub awarded_at: DateTime<Utc>,
}
