//! Post-commit consumers of EXP awards. Observers run only after the ledger
//! transaction committed and can never undo it.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;

use crate::models::progress::{AwardSource, ExpAward};

#[async_trait]
pub trait AwardObserver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn on_award(&self, award: &ExpAward) -> Result<()>;
}

/// Audit entries in the application log.
pub struct TracingAwardObserver;

#[async_trait]
impl AwardObserver for TracingAwardObserver {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn on_award(&self, award: &ExpAward) -> Result<()> {
        match &award.source {
            AwardSource::Exercise {
                exercise_id,
                part_id,
            } => tracing::info!(
                user_id = %award.user_id,
                exercise_id = %exercise_id,
                part_id = %part_id,
                exp = award.exp,
                total_before = award.total_before,
                total_after = award.total_after,
                "Exercise EXP awarded"
            ),
            AwardSource::PartBonus { part_id } => tracing::info!(
                user_id = %award.user_id,
                part_id = %part_id,
                exp = award.exp,
                total_before = award.total_before,
                total_after = award.total_after,
                "Part completion bonus awarded"
            ),
        }
        Ok(())
    }
}

/// Appends every award to a Redis stream for downstream consumers (badges, feeds).
pub struct RedisStreamObserver {
    redis: ConnectionManager,
    stream: String,
}

impl RedisStreamObserver {
    pub fn new(redis: ConnectionManager, stream: impl Into<String>) -> Self {
        Self {
            redis,
            stream: stream.into(),
        }
    }
}

#[async_trait]
impl AwardObserver for RedisStreamObserver {
    fn name(&self) -> &'static str {
        "redis_stream"
    }

    async fn on_award(&self, award: &ExpAward) -> Result<()> {
        let mut conn = self.redis.clone();
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream)
            .arg("*")
            .arg("user_id")
            .arg(&award.user_id)
            .arg("source")
            .arg(award.source.label())
            .arg("exp")
            .arg(award.exp)
            .arg("total_after")
            .arg(award.total_after)
            .arg("timestamp")
            .arg(award.awarded_at.timestamp_millis().to_string());

        match &award.source {
            AwardSource::Exercise {
                exercise_id,
                part_id,
            } => {
                cmd.arg("exercise_id")
                    .arg(exercise_id)
                    .arg("part_id")
                    .arg(part_id);
            }
            AwardSource::PartBonus { part_id } => {
                cmd.arg("part_id").arg(part_id);
            }
        }

        cmd.query_async::<String>(&mut conn)
            .await
            .context("Failed to publish EXP award event")?;
        Ok(())
    }
}

/// Fans committed awards out to every registered observer. Failures are logged only.
#[derive(Clone, Default)]
pub struct AwardNotifier {
    observers: Vec<Arc<dyn AwardObserver>>,
}

impl AwardNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_observer(mut self, observer: Arc<dyn AwardObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub async fn publish(&self, awards: &[ExpAward]) {
        for award in awards {
            for observer in &self.observers {
                if let Err(err) = observer.on_award(award).await {
                    tracing::warn!(
                        "Award observer {} failed for user {}: {:#}",
                        observer.name(),
                        award.user_id,
                        err
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl AwardObserver for Collecting {
        fn name(&self) -> &'static str {
            "collecting"
        }

        async fn on_award(&self, award: &ExpAward) -> Result<()> {
            self.seen.lock().unwrap().push(award.exp);
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl AwardObserver for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn on_award(&self, _award: &ExpAward) -> Result<()> {
            anyhow::bail!("sink offline")
        }
    }

    fn award(exp: i64) -> ExpAward {
        ExpAward {
            user_id: "u1".into(),
            source: AwardSource::PartBonus {
                part_id: "p1".into(),
            },
            exp,
            total_before: 0,
            total_after: exp,
            awarded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn failing_observer_does_not_block_others() {
        let collecting = Arc::new(Collecting::default());
        let notifier = AwardNotifier::new()
            .with_observer(Arc::new(Broken))
            .with_observer(collecting.clone());

        notifier.publish(&[award(10), award(50)]).await;

        assert_eq!(*collecting.seen.lock().unwrap(), vec![10, 50]);
    }
}
