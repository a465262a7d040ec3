//! Ledger storage. The submission path works through a [`LedgerTransaction`] so that
//! the attempt write and every EXP credit commit or roll back together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{
    progress::NewAttempt, AttemptRecord, Exercise, Part, RecordKey, RecordLevel, UserAccount,
};

pub mod memory;
pub mod mongo;

pub use memory::{CatalogSeed, MemoryProgressStore};
pub use mongo::MongoProgressStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Write conflict: {0}")]
    Conflict(String),

    #[error("Record missing: {0}")]
    Missing(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether the whole unit of work may be replayed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Mongo(err) => {
                err.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR)
            }
            StoreError::Conflict(_) => true,
            StoreError::Missing(_) | StoreError::Unavailable(_) => false,
        }
    }
}

/// Read access plus the entry point to transactional writes.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_part(&self, part_id: &str) -> Result<Option<Part>, StoreError>;

    async fn count_active_exercises(&self, part_id: &str) -> Result<u64, StoreError>;

    async fn find_account(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError>;

    async fn find_record(&self, key: &RecordKey) -> Result<Option<AttemptRecord>, StoreError>;

    /// Completed ledger rows of one level, optionally restricted to a part.
    async fn count_completed(
        &self,
        user_id: &str,
        level: RecordLevel,
        part_id: Option<&str>,
    ) -> Result<u64, StoreError>;

    async fn top_accounts(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError>;
}

/// One atomic unit of work. Dropping it without `commit` discards every write.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError>;

    async fn find_part(&mut self, part_id: &str) -> Result<Option<Part>, StoreError>;

    async fn find_account(&mut self, user_id: &str) -> Result<Option<UserAccount>, StoreError>;

    /// Ids of every exercise belonging to the part, active or not.
    async fn part_exercise_ids(&mut self, part_id: &str) -> Result<Vec<String>, StoreError>;

    /// Exercise-level rows of the user on `exercise_ids` that are completed and correct.
    /// Concurrent units for the same user that both count must not both commit.
    async fn count_correct(
        &mut self,
        user_id: &str,
        exercise_ids: &[String],
    ) -> Result<u64, StoreError>;

    /// Upserts the exercise-level row and increments its attempt counter atomically.
    async fn record_attempt(&mut self, attempt: NewAttempt) -> Result<AttemptRecord, StoreError>;

    /// Flips `reward_claimed` on the exercise row. Returns false if it was already set.
    async fn claim_exercise_reward(
        &mut self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<bool, StoreError>;

    /// Inserts the part-level row. Returns false if the part was completed before.
    async fn record_part_completion(
        &mut self,
        user_id: &str,
        part_id: &str,
        bonus_exp: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Atomically increments `total_exp` and returns the new total.
    async fn credit_exp(&mut self, user_id: &str, amount: i64) -> Result<i64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn abort(self: Box<Self>) -> Result<(), StoreError>;
}
