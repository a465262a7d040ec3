use std::sync::Arc;

use crate::metrics::record_read_fallback;
use crate::models::{
    progress::{progress_percentage, Dashboard, ExerciseStatus, PartProgress, ReadFault},
    RecordKey, RecordLevel,
};
use crate::store::{ProgressStore, StoreError};

/// Read-only projections over the ledger.
///
/// Anonymous callers get zeroed projections. Store failures are logged and degrade to
/// the same defaults, carrying a [`ReadFault`] marker where clients expect one.
#[derive(Clone)]
pub struct ProgressReader {
    store: Arc<dyn ProgressStore>,
}

impl ProgressReader {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    pub async fn part_progress(&self, user_id: Option<&str>, part_id: &str) -> PartProgress {
        let Some(user_id) = user_id else {
            return PartProgress::empty(part_id);
        };

        match self.load_part_progress(user_id, part_id).await {
            Ok(Some(progress)) => progress,
            Ok(None) => {
                tracing::debug!("Progress requested for unknown part {}", part_id);
                PartProgress::empty(part_id).with_fault(ReadFault::PartNotFound)
            }
            Err(err) => {
                tracing::error!(
                    "Part progress read failed: user={}, part={}: {}",
                    user_id,
                    part_id,
                    err
                );
                record_read_fallback("part_progress");
                PartProgress::empty(part_id).with_fault(ReadFault::ServerError)
            }
        }
    }

    async fn load_part_progress(
        &self,
        user_id: &str,
        part_id: &str,
    ) -> Result<Option<PartProgress>, StoreError> {
        if self.store.find_part(part_id).await?.is_none() {
            return Ok(None);
        }

        let total_exercises = self.store.count_active_exercises(part_id).await?;
        let completed_exercises = self
            .store
            .count_completed(user_id, RecordLevel::Exercise, Some(part_id))
            .await?;
        let part_completed = self
            .store
            .find_record(&RecordKey::part(user_id, part_id))
            .await?
            .is_some_and(|record| record.completed);

        Ok(Some(PartProgress {
            part_id: part_id.to_string(),
            total_exercises,
            completed_exercises,
            progress_percentage: progress_percentage(completed_exercises, total_exercises),
            part_completed,
            error: None,
        }))
    }

    /// Never fails: the dashboard widget always renders.
    pub async fn dashboard(&self, user_id: Option<&str>) -> Dashboard {
        let Some(user_id) = user_id else {
            return Dashboard::default();
        };

        match self.load_dashboard(user_id).await {
            Ok(Some(dashboard)) => dashboard,
            Ok(None) => {
                tracing::warn!("Dashboard requested for unknown user {}", user_id);
                Dashboard::default()
            }
            Err(err) => {
                tracing::error!("Dashboard read failed: user={}: {}", user_id, err);
                record_read_fallback("dashboard");
                Dashboard::default()
            }
        }
    }

    async fn load_dashboard(&self, user_id: &str) -> Result<Option<Dashboard>, StoreError> {
        let Some(account) = self.store.find_account(user_id).await? else {
            return Ok(None);
        };

        let completed_parts = self
            .store
            .count_completed(user_id, RecordLevel::Part, None)
            .await?;
        let completed_exercises = self
            .store
            .count_completed(user_id, RecordLevel::Exercise, None)
            .await?;

        Ok(Some(Dashboard {
            total_exp: account.total_exp,
            level: account.level(),
            completed_parts,
            completed_exercises,
            streak: account.current_streak,
        }))
    }

    pub async fn exercise_status(&self, user_id: Option<&str>, exercise_id: &str) -> ExerciseStatus {
        let Some(user_id) = user_id else {
            return ExerciseStatus::default();
        };

        match self
            .store
            .find_record(&RecordKey::exercise(user_id, exercise_id))
            .await
        {
            Ok(record) => ExerciseStatus::from(record),
            Err(err) => {
                tracing::error!(
                    "Exercise status read failed: user={}, exercise={}: {}",
                    user_id,
                    exercise_id,
                    err
                );
                record_read_fallback("exercise_status");
                ExerciseStatus {
                    error: Some(ReadFault::StatusUnavailable),
                    ..ExerciseStatus::default()
                }
            }
        }
    }
}
