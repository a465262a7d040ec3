use serde::{Deserialize, Serialize};

/// Learner account stored in MongoDB "users" collection. The EXP total lives here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAccount {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub total_exp: i64,
    /// Maintained by the streak collaborator, read-only for the progress engine.
    #[serde(default)]
    pub current_streak: i64,
}

impl UserAccount {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            total_exp: 0,
            current_streak: 0,
        }
    }

    pub fn level(&self) -> i64 {
        level_for(self.total_exp)
    }
}

pub fn level_for(total_exp: i64) -> i64 {
    total_exp.max(0) / 100 + 1
}

#[derive(Debug, Serialize)]
pub struct UserStats {
    pub total_exp: i64,
    pub current_streak: i64,
    pub completed_parts: u64,
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub user_id: String,
    pub name: String,
    pub total_exp: i64,
}

impl From<UserAccount> for LeaderboardEntry {
    fn from(account: UserAccount) -> Self {
        LeaderboardEntry {
            user_id: account.id,
            name: account.name,
            total_exp: account.total_exp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TreeStage {
    Seed,
    Sprout,
    SmallTree,
    BigTree,
    LegendaryTree,
}

impl TreeStage {
    pub fn for_exp(exp: i64) -> Self {
        match exp {
            i64::MIN..=99 => TreeStage::Seed,
            100..=499 => TreeStage::Sprout,
            500..=999 => TreeStage::SmallTree,
            1000..=4999 => TreeStage::BigTree,
            _ => TreeStage::LegendaryTree,
        }
    }

    /// EXP needed to leave this stage; 0 once the last stage is reached.
    pub fn next_stage_exp(&self) -> i64 {
        match self {
            TreeStage::Seed => 100,
            TreeStage::Sprout => 500,
            TreeStage::SmallTree => 1000,
            TreeStage::BigTree => 5000,
            TreeStage::LegendaryTree => 0,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TreeView {
    pub stage: TreeStage,
    pub exp: i64,
    pub next_stage_exp: i64,
}

// Serde converters for chrono::DateTime <-> mongodb::bson::DateTime
pub(super) mod bson_datetime_as_chrono {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(date: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let bson_dt = bson::DateTime::from_millis(date.timestamp_millis());
        bson_dt.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bson_dt = bson::DateTime::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(bson_dt.timestamp_millis())
            .ok_or_else(|| D::Error::custom("timestamp out of range"))
    }
}
