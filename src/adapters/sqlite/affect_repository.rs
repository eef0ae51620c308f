//! SQLite implementation of bond and emotion persistence.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AffectionSample, BondState, BondTrend, EmotionInstance, EmotionState, EmotionType,
    StimulusRecord,
};
use crate::domain::ports::AffectRepository;

#[derive(Clone)]
pub struct SqliteAffectRepository {
    pool: SqlitePool,
}

impl SqliteAffectRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AffectRepository for SqliteAffectRepository {
    async fn load_bond(&self, user_id: &str) -> DomainResult<Option<BondState>> {
        let row: Option<BondRow> = sqlx::query_as("SELECT * FROM bond_states WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(BondState::try_from).transpose()
    }

    async fn save_bond(&self, state: &BondState) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO bond_states (
                user_id, affection_level, trend, last_interaction_at, last_meaningful_at,
                streak_days, streak_last_date, affection_history
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                affection_level = excluded.affection_level,
                trend = excluded.trend,
                last_interaction_at = excluded.last_interaction_at,
                last_meaningful_at = excluded.last_meaningful_at,
                streak_days = excluded.streak_days,
                streak_last_date = excluded.streak_last_date,
                affection_history = excluded.affection_history",
        )
        .bind(&state.user_id)
        .bind(state.affection_level)
        .bind(state.trend.as_str())
        .bind(state.last_interaction_at.to_rfc3339())
        .bind(state.last_meaningful_at.map(|t| t.to_rfc3339()))
        .bind(i64::from(state.streak_days))
        .bind(state.streak_last_date.map(|d| d.to_string()))
        .bind(serde_json::to_string(&state.affection_history)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_emotion(&self, session_id: Uuid) -> DomainResult<Option<EmotionState>> {
        let row: Option<EmotionRow> =
            sqlx::query_as("SELECT * FROM emotion_states WHERE session_id = ?")
                .bind(session_id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(EmotionState::try_from).transpose()
    }

    async fn save_emotion(&self, state: &EmotionState) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO emotion_states (
                session_id, active_emotions, primary_type, primary_intensity,
                secondary_type, secondary_intensity, overall_intensity,
                last_decay_at, last_update, appraisal_snapshot, trigger_snapshot
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                active_emotions = excluded.active_emotions,
                primary_type = excluded.primary_type,
                primary_intensity = excluded.primary_intensity,
                secondary_type = excluded.secondary_type,
                secondary_intensity = excluded.secondary_intensity,
                overall_intensity = excluded.overall_intensity,
                last_decay_at = excluded.last_decay_at,
                last_update = excluded.last_update,
                appraisal_snapshot = excluded.appraisal_snapshot,
                trigger_snapshot = excluded.trigger_snapshot",
        )
        .bind(state.session_id.to_string())
        .bind(serde_json::to_string(&state.active_emotions)?)
        .bind(state.primary_type.as_str())
        .bind(state.primary_intensity)
        .bind(state.secondary_type.map(|t| t.as_str()))
        .bind(state.secondary_intensity)
        .bind(state.overall_intensity)
        .bind(state.last_decay_at.to_rfc3339())
        .bind(state.last_update.to_rfc3339())
        .bind(state.appraisal_snapshot.as_ref().map(serde_json::Value::to_string))
        .bind(state.trigger_snapshot.as_ref().map(serde_json::Value::to_string))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_stimulus(&self, session_id: Uuid, record: &StimulusRecord) -> DomainResult<()> {
        sqlx::query(
            r"INSERT INTO stimulus_history (session_id, stimulus_type, valence, intensity, timestamp, context)
              VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id.to_string())
        .bind(&record.stimulus_type)
        .bind(record.valence)
        .bind(record.intensity)
        .bind(record.timestamp.to_rfc3339())
        .bind(record.context.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_stimuli(
        &self,
        session_id: Uuid,
        since: DateTime<Utc>,
    ) -> DomainResult<Vec<StimulusRecord>> {
        let rows: Vec<StimulusRow> = sqlx::query_as(
            "SELECT * FROM stimulus_history
             WHERE session_id = ? AND timestamp >= ? ORDER BY timestamp ASC",
        )
        .bind(session_id.to_string())
        .bind(since.to_rfc3339())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(StimulusRecord::try_from).collect()
    }
}

#[derive(sqlx::FromRow)]
struct BondRow {
    user_id: String,
    affection_level: f64,
    trend: String,
    last_interaction_at: String,
    last_meaningful_at: Option<String>,
    streak_days: i64,
    streak_last_date: Option<String>,
    affection_history: Option<String>,
}

impl TryFrom<BondRow> for BondState {
    type Error = DomainError;

    fn try_from(row: BondRow) -> Result<Self, Self::Error> {
        let trend = BondTrend::from_str(&row.trend)
            .ok_or_else(|| DomainError::Serialization(format!("Invalid trend: {}", row.trend)))?;
        let streak_last_date = row
            .streak_last_date
            .map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d"))
            .transpose()
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        let affection_history: Vec<AffectionSample> =
            super::parse_json_or_default(row.affection_history)?;
        Ok(BondState {
            user_id: row.user_id,
            affection_level: row.affection_level,
            trend,
            last_interaction_at: super::parse_datetime(&row.last_interaction_at)?,
            last_meaningful_at: super::parse_optional_datetime(row.last_meaningful_at)?,
            streak_days: row.streak_days as u32,
            streak_last_date,
            affection_history,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EmotionRow {
    session_id: String,
    active_emotions: String,
    primary_type: String,
    primary_intensity: f64,
    secondary_type: Option<String>,
    secondary_intensity: Option<f64>,
    overall_intensity: f64,
    last_decay_at: String,
    last_update: String,
    appraisal_snapshot: Option<String>,
    trigger_snapshot: Option<String>,
}

impl TryFrom<EmotionRow> for EmotionState {
    type Error = DomainError;

    fn try_from(row: EmotionRow) -> Result<Self, Self::Error> {
        let active_emotions: Vec<EmotionInstance> = serde_json::from_str(&row.active_emotions)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        let primary_type = EmotionType::from_str(&row.primary_type).ok_or_else(|| {
            DomainError::Serialization(format!("Invalid emotion: {}", row.primary_type))
        })?;
        let secondary_type = row
            .secondary_type
            .as_deref()
            .map(|s| {
                EmotionType::from_str(s)
                    .ok_or_else(|| DomainError::Serialization(format!("Invalid emotion: {s}")))
            })
            .transpose()?;
        let parse_snapshot = |s: Option<String>| -> DomainResult<Option<serde_json::Value>> {
            s.map(|s| serde_json::from_str(&s))
                .transpose()
                .map_err(|e| DomainError::Serialization(e.to_string()))
        };
        Ok(EmotionState {
            session_id: super::parse_uuid(&row.session_id)?,
            active_emotions,
            primary_type,
            primary_intensity: row.primary_intensity,
            secondary_type,
            secondary_intensity: row.secondary_intensity,
            overall_intensity: row.overall_intensity,
            last_decay_at: super::parse_datetime(&row.last_decay_at)?,
            last_update: super::parse_datetime(&row.last_update)?,
            appraisal_snapshot: parse_snapshot(row.appraisal_snapshot)?,
            trigger_snapshot: parse_snapshot(row.trigger_snapshot)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StimulusRow {
    #[allow(dead_code)]
    id: i64,
    #[allow(dead_code)]
    session_id: String,
    stimulus_type: String,
    valence: f64,
    intensity: f64,
    timestamp: String,
    context: Option<String>,
}

impl TryFrom<StimulusRow> for StimulusRecord {
    type Error = DomainError;

    fn try_from(row: StimulusRow) -> Result<Self, Self::Error> {
        let context = row
            .context
            .map(|s| serde_json::from_str(&s))
            .transpose()
            .map_err(|e| DomainError::Serialization(e.to_string()))?
            .unwrap_or(serde_json::Value::Null);
        Ok(StimulusRecord {
            stimulus_type: row.stimulus_type,
            valence: row.valence,
            intensity: row.intensity,
            timestamp: super::parse_datetime(&row.timestamp)?,
            context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn bond_round_trip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAffectRepository::new(pool);

        assert!(repo.load_bond("someone").await.unwrap().is_none());

        let mut state = BondState::new("someone", 50.0);
        state.streak_days = 3;
        state.streak_last_date = Some(Utc::now().date_naive());
        state.affection_history.push(AffectionSample {
            timestamp: Utc::now(),
            affection: 50.0,
            reason: "standard".into(),
        });
        repo.save_bond(&state).await.unwrap();

        let loaded = repo.load_bond("someone").await.unwrap().unwrap();
        assert!((loaded.affection_level - 50.0).abs() < f64::EPSILON);
        assert_eq!(loaded.streak_days, 3);
        assert_eq!(loaded.affection_history.len(), 1);

        // Upsert path
        state.affection_level = 60.0;
        repo.save_bond(&state).await.unwrap();
        let loaded = repo.load_bond("someone").await.unwrap().unwrap();
        assert!((loaded.affection_level - 60.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn emotion_round_trip() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAffectRepository::new(pool);
        let session_id = Uuid::new_v4();

        let mut state = EmotionState::empty(session_id);
        state.active_emotions.push(EmotionInstance::new(EmotionType::Interest, 42.0));
        state.primary_type = EmotionType::Interest;
        state.primary_intensity = 42.0;
        repo.save_emotion(&state).await.unwrap();

        let loaded = repo.load_emotion(session_id).await.unwrap().unwrap();
        assert_eq!(loaded.primary_type, EmotionType::Interest);
        assert_eq!(loaded.active_emotions.len(), 1);
    }

    #[tokio::test]
    async fn stimuli_filtered_by_time() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteAffectRepository::new(pool);
        let session_id = Uuid::new_v4();

        let old = StimulusRecord {
            stimulus_type: "message".into(),
            valence: 2.0,
            intensity: 30.0,
            timestamp: Utc::now() - chrono::Duration::hours(2),
            context: serde_json::Value::Null,
        };
        let fresh = StimulusRecord { timestamp: Utc::now(), ..old.clone() };
        repo.record_stimulus(session_id, &old).await.unwrap();
        repo.record_stimulus(session_id, &fresh).await.unwrap();

        let recent = repo
            .recent_stimuli(session_id, Utc::now() - chrono::Duration::minutes(10))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
    }
}
