//! Emotion manager.
//!
//! One instance per active session, hydrated from the store on first use.
//! Every stimulus runs the pipeline: decay active emotions by elapsed wall
//! time, appraise through the helper model, apply physics to the resulting
//! intensities, record the stimulus, persist.

use chrono::{Duration, Timelike, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AppraisalOutput, CurrentMood, EmotionInstance, EmotionState, EmotionType, Valence,
};
use crate::domain::ports::{AffectRepository, LlmHelper};

use super::decay::{apply_decay_to_emotions, DecayContext, TimeOfDay};
use super::history::{make_record, StimulusBuffer};
use super::physics::{calculate_intensity_change, PhysicsContext};

/// Emotions below this intensity are dropped after physics.
const MINIMUM_INTENSITY: f64 = 1.0;

/// Window considered "recent" for physics and activity estimates.
const RECENT_WINDOW_MINUTES: i64 = 10;
const ACTIVITY_WINDOW_MINUTES: i64 = 15;

struct Inner {
    active_emotions: Vec<EmotionInstance>,
    stimuli: StimulusBuffer,
    last_decay_at: chrono::DateTime<Utc>,
    hydrated: bool,
}

pub struct EmotionManager {
    session_id: Uuid,
    repo: Arc<dyn AffectRepository>,
    helper: Option<Arc<dyn LlmHelper>>,
    persona_name: String,
    inner: Mutex<Inner>,
}

impl EmotionManager {
    pub fn new(
        session_id: Uuid,
        repo: Arc<dyn AffectRepository>,
        helper: Option<Arc<dyn LlmHelper>>,
        persona_name: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            repo,
            helper,
            persona_name: persona_name.into(),
            inner: Mutex::new(Inner {
                active_emotions: Vec::new(),
                stimuli: StimulusBuffer::new(),
                last_decay_at: Utc::now(),
                hydrated: false,
            }),
        }
    }

    async fn hydrate(&self, inner: &mut Inner) -> DomainResult<()> {
        if inner.hydrated {
            return Ok(());
        }
        if let Some(state) = self.repo.load_emotion(self.session_id).await? {
            inner.active_emotions = state.active_emotions;
            inner.last_decay_at = state.last_decay_at;
            tracing::info!(
                session_id = %self.session_id,
                emotions = inner.active_emotions.len(),
                "Loaded emotion state"
            );
        }
        let since = Utc::now() - Duration::minutes(RECENT_WINDOW_MINUTES);
        inner.stimuli.hydrate(self.repo.recent_stimuli(self.session_id, since).await?);
        inner.hydrated = true;
        Ok(())
    }

    /// Run one stimulus through the pipeline and return the active set.
    pub async fn process_stimulus(
        &self,
        stimulus: serde_json::Value,
        context: serde_json::Value,
    ) -> DomainResult<Vec<EmotionInstance>> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await?;

        self.decay_locked(&mut inner).await?;

        let Some(helper) = self.helper.clone() else {
            return Ok(inner.active_emotions.clone());
        };

        let summary = summarize_state(&inner.active_emotions);
        let appraisal = match helper.appraise(&stimulus, &summary, &self.persona_name).await {
            Ok(appraisal) => appraisal,
            Err(e) => {
                // Appraisal failures leave the post-decay state intact.
                tracing::warn!(session_id = %self.session_id, error = %e, "Appraisal failed");
                return Ok(inner.active_emotions.clone());
            }
        };

        if appraisal.resulting_emotions.is_empty() {
            return Ok(inner.active_emotions.clone());
        }

        let mut changed = false;
        let recent = inner.stimuli.recent(Duration::minutes(RECENT_WINDOW_MINUTES));
        for appraised in &appraisal.resulting_emotions {
            if appraised.emotion_type == EmotionType::Neutral {
                continue;
            }
            let physics = calculate_intensity_change(
                appraised.emotion_type,
                appraised.intensity,
                &PhysicsContext { current_emotions: &inner.active_emotions, recent_stimuli: &recent },
            );

            if physics.final_intensity > MINIMUM_INTENSITY {
                match inner
                    .active_emotions
                    .iter_mut()
                    .find(|e| e.emotion_type == appraised.emotion_type)
                {
                    Some(existing) => {
                        existing.intensity = physics.final_intensity;
                        existing.last_updated = Utc::now();
                    }
                    None => inner
                        .active_emotions
                        .push(EmotionInstance::new(appraised.emotion_type, physics.final_intensity)),
                }
                changed = true;
            } else {
                let before = inner.active_emotions.len();
                inner.active_emotions.retain(|e| e.emotion_type != appraised.emotion_type);
                changed |= inner.active_emotions.len() != before;
            }
        }

        self.record_stimulus(&mut inner, &stimulus, &appraisal, context).await;

        if changed {
            self.persist(&inner, Some(&appraisal), Some(&stimulus)).await?;
            tracing::info!(
                session_id = %self.session_id,
                active = inner.active_emotions.len(),
                "Emotional state updated"
            );
        }

        Ok(inner.active_emotions.clone())
    }

    /// Apply pending decay without a stimulus (used by background sweeps).
    pub async fn apply_decay(&self) -> DomainResult<Vec<EmotionInstance>> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await?;
        self.decay_locked(&mut inner).await?;
        Ok(inner.active_emotions.clone())
    }

    async fn decay_locked(&self, inner: &mut Inner) -> DomainResult<()> {
        let now = Utc::now();
        let minutes = (now - inner.last_decay_at).num_milliseconds() as f64 / 60_000.0;
        if minutes < 0.1 {
            return Ok(());
        }

        let context = DecayContext {
            recent_emotional_activity: recent_activity(&inner.stimuli),
            time_of_day: TimeOfDay::from_hour(chrono::Local::now().time().hour()),
            ..DecayContext::default()
        };
        let (updated, activity) =
            apply_decay_to_emotions(&inner.active_emotions, minutes, &context);
        inner.active_emotions = updated;
        inner.last_decay_at = now;

        if activity > 0.0 {
            tracing::debug!(
                session_id = %self.session_id,
                total_activity = activity,
                remaining = inner.active_emotions.len(),
                "Emotion decay applied"
            );
            self.persist(inner, None, None).await?;
        }
        Ok(())
    }

    async fn record_stimulus(
        &self,
        inner: &mut Inner,
        stimulus: &serde_json::Value,
        appraisal: &AppraisalOutput,
        context: serde_json::Value,
    ) {
        let stimulus_type = stimulus
            .get("type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown")
            .to_string();

        // Valence and intensity derive from the appraised emotions.
        let mut valence = 0.0;
        let mut intensity: f64 = 0.0;
        for emotion in &appraisal.resulting_emotions {
            match emotion.emotion_type.characteristics().valence {
                Valence::Positive => valence += emotion.intensity / 10.0,
                Valence::Negative => valence -= emotion.intensity / 10.0,
                Valence::Neutral => {}
            }
            intensity = intensity.max(emotion.intensity);
        }

        let record = make_record(stimulus_type, valence, intensity, context, Utc::now());
        inner.stimuli.add(record.clone());

        if let Err(e) = self.repo.record_stimulus(self.session_id, &record).await {
            tracing::error!(session_id = %self.session_id, error = %e, "Failed to persist stimulus");
        }
    }

    async fn persist(
        &self,
        inner: &Inner,
        appraisal: Option<&AppraisalOutput>,
        trigger: Option<&serde_json::Value>,
    ) -> DomainResult<()> {
        let mut ranked = inner.active_emotions.clone();
        ranked.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));

        let primary = ranked.first();
        let secondary = ranked.get(1);

        let state = EmotionState {
            session_id: self.session_id,
            active_emotions: inner.active_emotions.clone(),
            primary_type: primary.map_or(EmotionType::Neutral, |e| e.emotion_type),
            primary_intensity: primary.map_or(0.0, |e| e.intensity),
            secondary_type: secondary.map(|e| e.emotion_type),
            secondary_intensity: secondary.map(|e| e.intensity),
            overall_intensity: primary.map_or(0.0, |e| e.intensity),
            last_decay_at: inner.last_decay_at,
            last_update: Utc::now(),
            appraisal_snapshot: appraisal.map(|a| serde_json::to_value(a)).transpose()?,
            trigger_snapshot: trigger.cloned(),
        };
        self.repo.save_emotion(&state).await
    }

    /// The highest non-neutral intensity emotion, if any.
    pub async fn current_dominant_emotion(&self) -> DomainResult<Option<EmotionInstance>> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await?;
        Ok(dominant(&inner.active_emotions))
    }

    /// Short natural-language sentence for prompt injection.
    pub async fn emotional_state_summary(&self) -> DomainResult<String> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await?;
        Ok(summarize_state(&inner.active_emotions))
    }

    /// Simplified current mood: the dominant non-neutral emotion, or `None`
    /// when nothing significant is active.
    pub async fn current_mood(&self) -> DomainResult<Option<CurrentMood>> {
        let mut inner = self.inner.lock().await;
        self.hydrate(&mut inner).await?;
        Ok(dominant(&inner.active_emotions).map(|e| CurrentMood {
            dominant_emotion_type: e.emotion_type,
            intensity: e.intensity,
            last_updated: e.last_updated,
        }))
    }
}

fn dominant(emotions: &[EmotionInstance]) -> Option<EmotionInstance> {
    emotions
        .iter()
        .filter(|e| e.emotion_type != EmotionType::Neutral)
        .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
        .cloned()
}

fn summarize_state(emotions: &[EmotionInstance]) -> String {
    let Some(dominant) = dominant(emotions) else {
        return "Note: No particular emotional signals detected.".to_string();
    };

    let name = dominant.emotion_type.as_str().replace('-', " ");
    let guidance = if dominant.intensity > 70.0 {
        "Respond with care and attention to this."
    } else if dominant.intensity > 40.0 {
        "Keep this in mind when responding."
    } else {
        "Minor signal, don't overreact."
    };
    format!("Context: User showing signs of {name}. {guidance}")
}

fn recent_activity(stimuli: &StimulusBuffer) -> f64 {
    let recent = stimuli.recent(Duration::minutes(ACTIVITY_WINDOW_MINUTES));
    if recent.is_empty() {
        return 0.0;
    }
    let frequency = (recent.len() as f64 / 10.0).min(1.0);
    let avg_intensity =
        recent.iter().map(|s| s.valence.abs()).sum::<f64>() / recent.len() as f64 / 10.0;
    (frequency + avg_intensity) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAffectRepository};

    async fn manager_without_helper() -> EmotionManager {
        let pool = create_migrated_test_pool().await.unwrap();
        EmotionManager::new(
            Uuid::new_v4(),
            Arc::new(SqliteAffectRepository::new(pool)),
            None,
            "Test",
        )
    }

    #[tokio::test]
    async fn no_helper_returns_post_decay_state() {
        let manager = manager_without_helper().await;
        let emotions = manager
            .process_stimulus(serde_json::json!({"type": "message"}), serde_json::Value::Null)
            .await
            .unwrap();
        assert!(emotions.is_empty());
    }

    #[tokio::test]
    async fn current_mood_reflects_dominant() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = Arc::new(SqliteAffectRepository::new(pool));
        let session_id = Uuid::new_v4();

        let mut state = EmotionState::empty(session_id);
        state.active_emotions.push(EmotionInstance::new(EmotionType::Interest, 45.0));
        repo.save_emotion(&state).await.unwrap();

        let manager = EmotionManager::new(session_id, repo, None, "Test");
        let mood = manager.current_mood().await.unwrap().unwrap();
        assert_eq!(mood.dominant_emotion_type, EmotionType::Interest);
        assert!((mood.intensity - 45.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn current_mood_is_none_when_empty() {
        let manager = manager_without_helper().await;
        assert!(manager.current_mood().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dominant_ignores_neutral() {
        let emotions = vec![
            EmotionInstance::new(EmotionType::Neutral, 90.0),
            EmotionInstance::new(EmotionType::Interest, 40.0),
        ];
        let top = dominant(&emotions).unwrap();
        assert_eq!(top.emotion_type, EmotionType::Interest);
    }

    #[test]
    fn summary_language_by_intensity() {
        let strong = vec![EmotionInstance::new(EmotionType::Distress, 80.0)];
        assert!(summarize_state(&strong).contains("Respond with care"));

        let mild = vec![EmotionInstance::new(EmotionType::Interest, 20.0)];
        assert!(summarize_state(&mild).contains("don't overreact"));

        assert!(summarize_state(&[]).contains("No particular emotional signals"));
    }

    #[test]
    fn summary_spells_out_hyphenated_names() {
        let emotions = vec![EmotionInstance::new(EmotionType::HappyFor, 50.0)];
        assert!(summarize_state(&emotions).contains("happy for"));
    }
}
