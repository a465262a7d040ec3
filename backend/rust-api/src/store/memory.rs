use std::{collections::HashMap, path::Path, sync::Arc};

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LedgerTransaction, ProgressStore, StoreError};
use crate::models::{
    progress::NewAttempt, AttemptRecord, Exercise, ExerciseDocument, Part, RecordKey,
    RecordLevel, UserAccount,
};

/// Catalog and accounts loaded into the in-memory store at startup.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub exercises: Vec<ExerciseDocument>,
    #[serde(default)]
    pub users: Vec<UserAccount>,
}

#[derive(Debug, Default)]
struct MemoryState {
    exercises: HashMap<String, ExerciseDocument>,
    parts: HashMap<String, Part>,
    users: HashMap<String, UserAccount>,
    records: HashMap<String, AttemptRecord>,
}

impl MemoryState {
    fn count_completed(&self, user_id: &str, level: RecordLevel, part_id: Option<&str>) -> u64 {
        self.records
            .values()
            .filter(|r| r.user_id == user_id && r.completed && r.level() == level)
            .filter(|r| part_id.is_none_or(|part| r.part_id == part))
            .count() as u64
    }
}

/// Single-process store. One transaction holds the lock for its whole lifetime, so
/// units of work are fully serialized.
#[derive(Clone, Default)]
pub struct MemoryProgressStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: CatalogSeed) -> Self {
        let mut state = MemoryState::default();
        for part in seed.parts {
            state.parts.insert(part.id.clone(), part);
        }
        for exercise in seed.exercises {
            state.exercises.insert(exercise.id.clone(), exercise);
        }
        for user in seed.users {
            state.users.insert(user.id.clone(), user);
        }
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub async fn load_seed(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read seed file {}", path.display()))?;
        let seed: CatalogSeed =
            serde_json::from_str(&raw).context("Failed to parse catalog seed")?;
        tracing::info!(
            "Loaded seed: {} parts, {} exercises, {} users",
            seed.parts.len(),
            seed.exercises.len(),
            seed.users.len()
        );
        Ok(Self::from_seed(seed))
    }

    pub async fn insert_part(&self, part: Part) {
        self.state.lock().await.parts.insert(part.id.clone(), part);
    }

    pub async fn insert_exercise(&self, exercise: ExerciseDocument) {
        self.state
            .lock()
            .await
            .exercises
            .insert(exercise.id.clone(), exercise);
    }

    pub async fn insert_user(&self, user: UserAccount) {
        self.state.lock().await.users.insert(user.id.clone(), user);
    }
}

#[async_trait]
impl ProgressStore for MemoryProgressStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            users: HashMap::new(),
            records: HashMap::new(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_part(&self, part_id: &str) -> Result<Option<Part>, StoreError> {
        Ok(self.state.lock().await.parts.get(part_id).cloned())
    }

    async fn count_active_exercises(&self, part_id: &str) -> Result<u64, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .exercises
            .values()
            .filter(|e| e.part_id == part_id && e.is_active)
            .count() as u64)
    }

    async fn find_account(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn find_record(&self, key: &RecordKey) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(self.state.lock().await.records.get(&key.id()).cloned())
    }

    async fn count_completed(
        &self,
        user_id: &str,
        level: RecordLevel,
        part_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .state
            .lock()
            .await
            .count_completed(user_id, level, part_id))
    }

    async fn top_accounts(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError> {
        let state = self.state.lock().await;
        let mut accounts: Vec<UserAccount> = state.users.values().cloned().collect();
        accounts.sort_by(|a, b| b.total_exp.cmp(&a.total_exp).then_with(|| a.id.cmp(&b.id)));
        accounts.truncate(limit);
        Ok(accounts)
    }
}

/// Stages the rows it touches and writes them back under the held lock on `commit`.
/// Untouched rows are read straight from the locked state.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    users: HashMap<String, UserAccount>,
    records: HashMap<String, AttemptRecord>,
}

impl MemoryTransaction {
    fn record(&self, id: &str) -> Option<&AttemptRecord> {
        self.records.get(id).or_else(|| self.guard.records.get(id))
    }

    fn staged_record(&mut self, id: &str) -> Option<&mut AttemptRecord> {
        if !self.records.contains_key(id) {
            let current = self.guard.records.get(id)?.clone();
            self.records.insert(id.to_string(), current);
        }
        self.records.get_mut(id)
    }

    fn staged_user(&mut self, user_id: &str) -> Option<&mut UserAccount> {
        if !self.users.contains_key(user_id) {
            let current = self.guard.users.get(user_id)?.clone();
            self.users.insert(user_id.to_string(), current);
        }
        self.users.get_mut(user_id)
    }
}

#[async_trait]
impl LedgerTransaction for MemoryTransaction {
    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        Ok(self
            .guard
            .exercises
            .get(exercise_id)
            .cloned()
            .map(Exercise::from))
    }

    async fn find_part(&mut self, part_id: &str) -> Result<Option<Part>, StoreError> {
        Ok(self.guard.parts.get(part_id).cloned())
    }

    async fn find_account(&mut self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .users
            .get(user_id)
            .or_else(|| self.guard.users.get(user_id))
            .cloned())
    }

    async fn part_exercise_ids(&mut self, part_id: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .guard
            .exercises
            .values()
            .filter(|e| e.part_id == part_id)
            .map(|e| e.id.clone())
            .collect())
    }

    async fn count_correct(
        &mut self,
        user_id: &str,
        exercise_ids: &[String],
    ) -> Result<u64, StoreError> {
        Ok(exercise_ids
            .iter()
            .filter_map(|id| self.record(&RecordKey::exercise(user_id, id).id()))
            .filter(|r| r.completed && r.is_correct)
            .count() as u64)
    }

    async fn record_attempt(&mut self, attempt: NewAttempt) -> Result<AttemptRecord, StoreError> {
        let id = RecordKey::exercise(&attempt.user_id, &attempt.exercise_id).id();
        if self.staged_record(&id).is_none() {
            self.records.insert(
                id.clone(),
                AttemptRecord {
                    id: id.clone(),
                    user_id: attempt.user_id.clone(),
                    exercise_id: Some(attempt.exercise_id.clone()),
                    part_id: attempt.part_id.clone(),
                    completed: false,
                    user_answer: None,
                    is_correct: false,
                    exp_earned: 0,
                    attempts: 0,
                    reward_claimed: false,
                    completed_at: attempt.submitted_at,
                },
            );
        }
        let record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| StoreError::Missing(format!("attempt record {}", id)))?;

        record.part_id = attempt.part_id;
        record.completed = true;
        record.user_answer = Some(attempt.user_answer);
        record.is_correct = attempt.is_correct;
        record.exp_earned = attempt.exp_earned;
        record.attempts += 1;
        record.completed_at = attempt.submitted_at;

        Ok(record.clone())
    }

    async fn claim_exercise_reward(
        &mut self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<bool, StoreError> {
        let id = RecordKey::exercise(user_id, exercise_id).id();
        let record = self
            .staged_record(&id)
            .ok_or_else(|| StoreError::Missing(format!("attempt record {}", id)))?;
        if record.reward_claimed {
            return Ok(false);
        }
        record.reward_claimed = true;
        Ok(true)
    }

    async fn record_part_completion(
        &mut self,
        user_id: &str,
        part_id: &str,
        bonus_exp: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let id = RecordKey::part(user_id, part_id).id();
        if self.record(&id).is_some() {
            return Ok(false);
        }
        self.records.insert(
            id,
            AttemptRecord::part_completion(user_id, part_id, bonus_exp, at),
        );
        Ok(true)
    }

    async fn credit_exp(&mut self, user_id: &str, amount: i64) -> Result<i64, StoreError> {
        let account = self
            .staged_user(user_id)
            .ok_or_else(|| StoreError::Missing(format!("user {}", user_id)))?;
        account.total_exp += amount;
        Ok(account.total_exp)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            mut guard,
            users,
            records,
        } = *self;
        guard.users.extend(users);
        guard.records.extend(records);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
