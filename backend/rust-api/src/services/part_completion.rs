use crate::models::progress::PartEvaluation;
use crate::store::{LedgerTransaction, StoreError};

pub struct PartCompletionEvaluator;

impl PartCompletionEvaluator {
    /// Recomputes completion from the ledger rows visible inside `tx`.
    ///
    /// A missing part or a part without exercises is never complete.
    pub async fn evaluate(
        tx: &mut dyn LedgerTransaction,
        part_id: &str,
        user_id: &str,
    ) -> Result<PartEvaluation, StoreError> {
        let Some(part) = tx.find_part(part_id).await? else {
            tracing::debug!("Part {} not found while evaluating user {}", part_id, user_id);
            return Ok(PartEvaluation::incomplete());
        };

        let exercise_ids = tx.part_exercise_ids(part_id).await?;
        if exercise_ids.is_empty() {
            tracing::debug!("Part {} has no exercises", part_id);
            return Ok(PartEvaluation::incomplete());
        }

        let total_count = exercise_ids.len() as u64;
        let completed_count = tx.count_correct(user_id, &exercise_ids).await?;
        let completed = completed_count == total_count;

        tracing::debug!(
            "Part {} for user {}: {}/{} correct",
            part_id,
            user_id,
            completed_count,
            total_count
        );

        Ok(PartEvaluation {
            completed,
            bonus_exp: if completed { part.exp_reward.max(0) } else { 0 },
            completed_count,
            total_count,
        })
    }
}
