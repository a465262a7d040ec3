use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{
    answer_validator::AnswerValidator, award_observer::AwardNotifier,
    part_completion::PartCompletionEvaluator,
};
use crate::error::ProgressError;
use crate::metrics::{
    record_transaction, EXP_AWARDED_TOTAL, PART_COMPLETIONS_TOTAL, SUBMISSIONS_TOTAL,
};
use crate::models::progress::{
    AwardSource, ExpAward, NewAttempt, SubmissionResult, SubmitExerciseRequest,
};
use crate::store::{LedgerTransaction, ProgressStore};
use crate::utils::{
    retry::{retry_when, RetryConfig},
    time::now_millis,
};

/// Runs one exercise submission as a single ledger transaction.
///
/// Exercise EXP is credited only on the first correct submission of an exercise and a
/// part bonus only when the part-level record is created, so replays never pay twice.
/// Transactions that fail with a transient store error are replayed from scratch.
#[derive(Clone)]
pub struct SubmissionCoordinator {
    store: Arc<dyn ProgressStore>,
    notifier: AwardNotifier,
    retry: RetryConfig,
}

struct Outcome {
    result: SubmissionResult,
    awards: Vec<ExpAward>,
    part_newly_completed: bool,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn ProgressStore>, notifier: AwardNotifier) -> Self {
        Self {
            store,
            notifier,
            retry: RetryConfig::default(),
        }
    }

    pub async fn submit(
        &self,
        user_id: &str,
        req: &SubmitExerciseRequest,
    ) -> Result<SubmissionResult, ProgressError> {
        tracing::info!(
            "Processing exercise submission: user={}, exercise={}",
            user_id,
            req.exercise_id
        );

        let outcome = retry_when(
            self.retry.clone(),
            |err: &ProgressError| {
                let transient = err.is_transient();
                if transient {
                    record_transaction("retried");
                    tracing::warn!(
                        "Transient ledger failure for user={}, exercise={}, retrying: {}",
                        user_id,
                        req.exercise_id,
                        err
                    );
                }
                transient
            },
            || self.run_unit(user_id, req),
        )
        .await?;

        let result = outcome.result;
        SUBMISSIONS_TOTAL
            .with_label_values(&[if result.is_correct { "true" } else { "false" }])
            .inc();
        for award in &outcome.awards {
            EXP_AWARDED_TOTAL
                .with_label_values(&[award.source.label()])
                .inc_by(award.exp.max(0) as u64);
        }
        if outcome.part_newly_completed {
            PART_COMPLETIONS_TOTAL.inc();
        }

        self.notifier.publish(&outcome.awards).await;

        tracing::info!(
            "Submission processed: user={}, exercise={}, correct={}, exp={}, part_bonus={}, total={}",
            user_id,
            req.exercise_id,
            result.is_correct,
            result.exp_earned,
            result.part_exp_earned,
            result.user_total_exp
        );

        Ok(result)
    }

    async fn run_unit(
        &self,
        user_id: &str,
        req: &SubmitExerciseRequest,
    ) -> Result<Outcome, ProgressError> {
        let mut tx = self.store.begin().await?;
        let applied = apply(tx.as_mut(), user_id, req, now_millis()).await;

        match applied {
            Ok(outcome) => {
                if let Err(err) = tx.commit().await {
                    record_transaction("failed");
                    return Err(err.into());
                }
                record_transaction("committed");
                Ok(outcome)
            }
            Err(err) => {
                if let Err(abort_err) = tx.abort().await {
                    tracing::error!(
                        "Failed to abort ledger transaction for user={}: {}",
                        user_id,
                        abort_err
                    );
                }
                record_transaction("aborted");
                Err(err)
            }
        }
    }
}

async fn apply(
    tx: &mut dyn LedgerTransaction,
    user_id: &str,
    req: &SubmitExerciseRequest,
    now: DateTime<Utc>,
) -> Result<Outcome, ProgressError> {
    let exercise = tx
        .find_exercise(&req.exercise_id)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Submission for unknown exercise {} by user {}", req.exercise_id, user_id);
            ProgressError::NotFound(format!("Exercise {}", req.exercise_id))
        })?;

    let account = tx.find_account(user_id).await?.ok_or_else(|| {
        tracing::warn!("Submission by unknown user {}", user_id);
        ProgressError::NotFound(format!("User {}", user_id))
    })?;

    let is_correct = AnswerValidator::grade(&exercise, &req.user_answer);
    let reward = if is_correct { exercise.exp_reward } else { 0 };

    let record = tx
        .record_attempt(NewAttempt {
            user_id: user_id.to_string(),
            exercise_id: exercise.id.clone(),
            part_id: exercise.part_id.clone(),
            user_answer: req.user_answer.raw_text(),
            is_correct,
            exp_earned: reward,
            submitted_at: now,
        })
        .await?;

    let mut total = account.total_exp;
    let mut awards = Vec::new();
    let mut exp_earned = 0;
    let mut part_completed = false;
    let mut part_exp_earned = 0;
    let mut part_newly_completed = false;

    if is_correct {
        if tx.claim_exercise_reward(user_id, &exercise.id).await? && reward > 0 {
            let total_after = tx.credit_exp(user_id, reward).await?;
            awards.push(ExpAward {
                user_id: user_id.to_string(),
                source: AwardSource::Exercise {
                    exercise_id: exercise.id.clone(),
                    part_id: exercise.part_id.clone(),
                },
                exp: reward,
                total_before: total,
                total_after,
                awarded_at: now,
            });
            exp_earned = reward;
            total = total_after;
        }

        let evaluation = PartCompletionEvaluator::evaluate(tx, &exercise.part_id, user_id).await?;
        part_completed = evaluation.completed;

        if evaluation.completed {
            part_newly_completed = tx
                .record_part_completion(user_id, &exercise.part_id, evaluation.bonus_exp, now)
                .await?;

            if part_newly_completed && evaluation.bonus_exp > 0 {
                let total_after = tx.credit_exp(user_id, evaluation.bonus_exp).await?;
                awards.push(ExpAward {
                    user_id: user_id.to_string(),
                    source: AwardSource::PartBonus {
                        part_id: exercise.part_id.clone(),
                    },
                    exp: evaluation.bonus_exp,
                    total_before: total,
                    total_after,
                    awarded_at: now,
                });
                part_exp_earned = evaluation.bonus_exp;
                total = total_after;
            }
        }
    }

    Ok(Outcome {
        result: SubmissionResult {
            success: true,
            is_correct,
            exp_earned,
            part_completed,
            part_exp_earned,
            total_exp_earned: exp_earned + part_exp_earned,
            user_total_exp: total,
            progress: record.into(),
        },
        awards,
        part_newly_completed,
    })
}
