use std::sync::Arc;

use crate::error::ProgressError;
use crate::models::{
    user::{LeaderboardEntry, TreeStage, TreeView, UserStats},
    RecordLevel, UserAccount,
};
use crate::store::ProgressStore;

pub const LEADERBOARD_SIZE: usize = 10;

/// Account level reads: stats, leaderboard and the growth tree.
#[derive(Clone)]
pub struct StandingService {
    store: Arc<dyn ProgressStore>,
}

impl StandingService {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self { store }
    }

    async fn account(&self, user_id: &str) -> Result<UserAccount, ProgressError> {
        self.store
            .find_account(user_id)
            .await?
            .ok_or_else(|| ProgressError::NotFound(format!("User {}", user_id)))
    }

    pub async fn stats(&self, user_id: &str) -> Result<UserStats, ProgressError> {
        let account = self.account(user_id).await?;
        let completed_parts = self
            .store
            .count_completed(user_id, RecordLevel::Part, None)
            .await?;

        Ok(UserStats {
            total_exp: account.total_exp,
            current_streak: account.current_streak,
            completed_parts,
        })
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, ProgressError> {
        let accounts = self.store.top_accounts(LEADERBOARD_SIZE).await?;
        Ok(accounts.into_iter().map(LeaderboardEntry::from).collect())
    }

    pub async fn tree(&self, user_id: &str) -> Result<TreeView, ProgressError> {
        let account = self.account(user_id).await?;
        let stage = TreeStage::for_exp(account.total_exp);

        Ok(TreeView {
            stage,
            exp: account.total_exp,
            next_stage_exp: stage.next_stage_exp(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProgressStore;

    async fn service(accounts: &[(&str, i64)]) -> StandingService {
        let store = MemoryProgressStore::new();
        for (id, exp) in accounts {
            let mut account = UserAccount::new(*id, id.to_uppercase());
            account.total_exp = *exp;
            store.insert_user(account).await;
        }
        StandingService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn leaderboard_is_sorted_and_capped() {
        let accounts: Vec<(String, i64)> =
            (0..12).map(|i| (format!("u{:02}", i), i * 10)).collect();
        let refs: Vec<(&str, i64)> = accounts.iter().map(|(id, exp)| (id.as_str(), *exp)).collect();
        let service = service(&refs).await;

        let board = service.leaderboard().await.unwrap();
        assert_eq!(board.len(), LEADERBOARD_SIZE);
        assert_eq!(board[0].user_id, "u11");
        assert_eq!(board[0].total_exp, 110);
        assert!(board.windows(2).all(|w| w[0].total_exp >= w[1].total_exp));
    }

    #[tokio::test]
    async fn tree_follows_total_exp() {
        let service = service(&[("u1", 640)]).await;
        let tree = service.tree("u1").await.unwrap();
        assert_eq!(tree.stage, TreeStage::SmallTree);
        assert_eq!(tree.next_stage_exp, 1000);
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let service = service(&[]).await;
        assert!(matches!(
            service.stats("ghost").await,
            Err(ProgressError::NotFound(_))
        ));
    }
}
