use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, Bson, Document},
    error::UNKNOWN_TRANSACTION_COMMIT_RESULT,
    options::{FindOptions, ReturnDocument},
    Client, ClientSession, Collection, Database, IndexModel,
};

use super::{LedgerTransaction, ProgressStore, StoreError};
use crate::models::{
    progress::NewAttempt, AttemptRecord, Exercise, ExerciseDocument, Part, RecordKey,
    RecordLevel, UserAccount,
};
use crate::utils::time::chrono_to_bson;

const EXERCISES: &str = "exercises";
const PARTS: &str = "parts";
const USERS: &str = "users";
const PROGRESS: &str = "user_progress";

const COMMIT_RETRIES: usize = 3;

/// MongoDB backed ledger. Transactions require a replica set deployment.
#[derive(Clone)]
pub struct MongoProgressStore {
    client: Client,
    db: Database,
}

impl MongoProgressStore {
    pub fn new(client: Client, database: &str) -> Self {
        let db = client.database(database);
        Self { client, db }
    }

    pub async fn ensure_indexes(&self) -> Result<(), StoreError> {
        self.progress()
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "user_id": 1, "part_id": 1, "exercise_id": 1 })
                    .build(),
            )
            .await?;
        self.db
            .collection::<Document>(EXERCISES)
            .create_index(IndexModel::builder().keys(doc! { "part_id": 1 }).build())
            .await?;
        self.users()
            .create_index(IndexModel::builder().keys(doc! { "total_exp": -1 }).build())
            .await?;

        tracing::info!("MongoDB progress indexes ensured");
        Ok(())
    }

    fn progress(&self) -> Collection<AttemptRecord> {
        self.db.collection(PROGRESS)
    }

    fn users(&self) -> Collection<UserAccount> {
        self.db.collection(USERS)
    }
}

fn completed_filter(user_id: &str, level: RecordLevel, part_id: Option<&str>) -> Document {
    let mut filter = doc! { "user_id": user_id, "completed": true };
    match level {
        RecordLevel::Exercise => filter.insert("exercise_id", doc! { "$ne": Bson::Null }),
        RecordLevel::Part => filter.insert("exercise_id", Bson::Null),
    };
    if let Some(part_id) = part_id {
        filter.insert("part_id", part_id);
    }
    filter
}

fn evaluation_fence() -> Document {
    doc! { "$inc": { "ledger_version": 1_i64 } }
}

#[async_trait]
impl ProgressStore for MongoProgressStore {
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        Ok(Box::new(MongoTransaction {
            session,
            db: self.db.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    async fn find_part(&self, part_id: &str) -> Result<Option<Part>, StoreError> {
        Ok(self
            .db
            .collection::<Part>(PARTS)
            .find_one(doc! { "_id": part_id })
            .await?)
    }

    async fn count_active_exercises(&self, part_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .db
            .collection::<Document>(EXERCISES)
            .count_documents(doc! { "part_id": part_id, "is_active": { "$ne": false } })
            .await?)
    }

    async fn find_account(&self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self.users().find_one(doc! { "_id": user_id }).await?)
    }

    async fn find_record(&self, key: &RecordKey) -> Result<Option<AttemptRecord>, StoreError> {
        Ok(self.progress().find_one(doc! { "_id": key.id() }).await?)
    }

    async fn count_completed(
        &self,
        user_id: &str,
        level: RecordLevel,
        part_id: Option<&str>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .progress()
            .count_documents(completed_filter(user_id, level, part_id))
            .await?)
    }

    async fn top_accounts(&self, limit: usize) -> Result<Vec<UserAccount>, StoreError> {
        let options = FindOptions::builder()
            .sort(doc! { "total_exp": -1, "_id": 1 })
            .limit(limit as i64)
            .build();
        let cursor = self.users().find(doc! {}).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }
}

pub struct MongoTransaction {
    session: ClientSession,
    db: Database,
}

impl MongoTransaction {
    fn progress(&self) -> Collection<AttemptRecord> {
        self.db.collection(PROGRESS)
    }
}

#[async_trait]
impl LedgerTransaction for MongoTransaction {
    async fn find_exercise(&mut self, exercise_id: &str) -> Result<Option<Exercise>, StoreError> {
        let exercise = self
            .db
            .collection::<ExerciseDocument>(EXERCISES)
            .find_one(doc! { "_id": exercise_id })
            .session(&mut self.session)
            .await?;
        Ok(exercise.map(Exercise::from))
    }

    async fn find_part(&mut self, part_id: &str) -> Result<Option<Part>, StoreError> {
        Ok(self
            .db
            .collection::<Part>(PARTS)
            .find_one(doc! { "_id": part_id })
            .session(&mut self.session)
            .await?)
    }

    async fn find_account(&mut self, user_id: &str) -> Result<Option<UserAccount>, StoreError> {
        Ok(self
            .db
            .collection::<UserAccount>(USERS)
            .find_one(doc! { "_id": user_id })
            .session(&mut self.session)
            .await?)
    }

    async fn part_exercise_ids(&mut self, part_id: &str) -> Result<Vec<String>, StoreError> {
        let options = FindOptions::builder().projection(doc! { "_id": 1 }).build();
        let mut cursor = self
            .db
            .collection::<Document>(EXERCISES)
            .find(doc! { "part_id": part_id })
            .with_options(options)
            .session(&mut self.session)
            .await?;

        let mut ids = Vec::new();
        while let Some(item) = cursor.next(&mut self.session).await {
            let doc = item?;
            match doc.get("_id") {
                Some(Bson::String(id)) => ids.push(id.clone()),
                Some(other) => ids.push(other.to_string()),
                None => {}
            }
        }
        Ok(ids)
    }

    async fn count_correct(
        &mut self,
        user_id: &str,
        exercise_ids: &[String],
    ) -> Result<u64, StoreError> {
        // Every evaluation writes the user document, so two concurrent units for the same
        // user cannot both commit decisions based on a stale count.
        self.db
            .collection::<Document>(USERS)
            .update_one(doc! { "_id": user_id }, evaluation_fence())
            .session(&mut self.session)
            .await?;

        let filter = doc! {
            "user_id": user_id,
            "exercise_id": { "$in": exercise_ids.to_vec() },
            "completed": true,
            "is_correct": true,
        };
        Ok(self
            .progress()
            .count_documents(filter)
            .session(&mut self.session)
            .await?)
    }

    async fn record_attempt(&mut self, attempt: NewAttempt) -> Result<AttemptRecord, StoreError> {
        let record_id = RecordKey::exercise(&attempt.user_id, &attempt.exercise_id).id();
        let update = doc! {
            "$set": {
                "user_id": attempt.user_id.as_str(),
                "exercise_id": attempt.exercise_id.as_str(),
                "part_id": attempt.part_id.as_str(),
                "completed": true,
                "user_answer": attempt.user_answer.as_str(),
                "is_correct": attempt.is_correct,
                "exp_earned": attempt.exp_earned,
                "completed_at": chrono_to_bson(attempt.submitted_at),
            },
            "$inc": { "attempts": 1_i64 },
            "$setOnInsert": { "reward_claimed": false },
        };

        self.progress()
            .find_one_and_update(doc! { "_id": record_id.as_str() }, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .session(&mut self.session)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("attempt record {}", record_id)))
    }

    async fn claim_exercise_reward(
        &mut self,
        user_id: &str,
        exercise_id: &str,
    ) -> Result<bool, StoreError> {
        let record_id = RecordKey::exercise(user_id, exercise_id).id();
        let result = self
            .progress()
            .update_one(
                doc! { "_id": record_id.as_str(), "reward_claimed": { "$ne": true } },
                doc! { "$set": { "reward_claimed": true } },
            )
            .session(&mut self.session)
            .await?;
        Ok(result.modified_count == 1)
    }

    async fn record_part_completion(
        &mut self,
        user_id: &str,
        part_id: &str,
        bonus_exp: i64,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let record_id = RecordKey::part(user_id, part_id).id();
        let result = self
            .progress()
            .update_one(
                doc! { "_id": record_id.as_str() },
                doc! {
                    "$setOnInsert": {
                        "user_id": user_id,
                        "exercise_id": Bson::Null,
                        "part_id": part_id,
                        "completed": true,
                        "user_answer": Bson::Null,
                        "is_correct": true,
                        "exp_earned": bonus_exp,
                        "attempts": 0_i64,
                        "reward_claimed": true,
                        "completed_at": chrono_to_bson(at),
                    }
                },
            )
            .upsert(true)
            .session(&mut self.session)
            .await?;
        Ok(result.upserted_id.is_some())
    }

    async fn credit_exp(&mut self, user_id: &str, amount: i64) -> Result<i64, StoreError> {
        let account = self
            .db
            .collection::<UserAccount>(USERS)
            .find_one_and_update(
                doc! { "_id": user_id },
                doc! { "$inc": { "total_exp": amount } },
            )
            .return_document(ReturnDocument::After)
            .session(&mut self.session)
            .await?
            .ok_or_else(|| StoreError::Missing(format!("user {}", user_id)))?;
        Ok(account.total_exp)
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        let mut retries_left = COMMIT_RETRIES;
        loop {
            match self.session.commit_transaction().await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) && retries_left > 0 =>
                {
                    retries_left -= 1;
                    tracing::warn!("Commit result unknown, retrying commit: {}", err);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn abort(mut self: Box<Self>) -> Result<(), StoreError> {
        self.session.abort_transaction().await?;
        Ok(())
    }
}
