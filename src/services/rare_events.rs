//! Rare-event generator.
//!
//! A background loop periodically snapshots bond/emotion/activity state and
//! probabilistically emits UI-bound events. Cooldown and a daily cap bound
//! the frequency; each candidate type is drawn independently and the first
//! success wins.

use chrono::{Datelike, Timelike, Utc, Weekday};
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::DomainResult;
use crate::domain::models::{RareEvent, RareEventType};
use crate::domain::ports::RareEventRepository;

#[derive(Debug, Clone)]
pub struct RareEventGeneratorConfig {
    pub check_interval: Duration,
    pub cooldown_minutes: i64,
    pub daily_event_limit: usize,

    // Per-type probabilities at full bond.
    pub note_probability: f64,
    pub observation_probability: f64,
    pub mood_shift_probability: f64,
    pub memory_probability: f64,
    pub greeting_probability: f64,

    pub min_bond_for_notes: f64,
    pub min_bond_for_memory: f64,
}

impl Default for RareEventGeneratorConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(300),
            cooldown_minutes: 60,
            daily_event_limit: 5,
            note_probability: 0.15,
            observation_probability: 0.20,
            mood_shift_probability: 0.10,
            memory_probability: 0.05,
            greeting_probability: 0.30,
            min_bond_for_notes: 40.0,
            min_bond_for_memory: 60.0,
        }
    }
}

/// Snapshot of current state used for trigger evaluation.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub affection_level: f64,
    pub bond_trend: String,
    pub streak_days: u32,
    pub emotion_type: String,
    /// 0-1
    pub emotion_intensity: f64,
    pub is_idle: bool,
    pub idle_minutes: u32,
    pub activity_category: String,
    pub hour: u32,
    pub is_morning: bool,
    pub is_evening: bool,
    pub weekday: Weekday,
}

impl TriggerContext {
    pub fn at_hour(hour: u32) -> Self {
        Self {
            affection_level: 50.0,
            bond_trend: "stable".to_string(),
            streak_days: 0,
            emotion_type: "neutral".to_string(),
            emotion_intensity: 0.0,
            is_idle: true,
            idle_minutes: 0,
            activity_category: "absent".to_string(),
            hour,
            is_morning: (5..12).contains(&hour),
            is_evening: (17..22).contains(&hour),
            weekday: Utc::now().weekday(),
        }
    }

    pub fn now() -> Self {
        let now = chrono::Local::now();
        let mut ctx = Self::at_hour(now.hour());
        ctx.weekday = now.weekday();
        ctx
    }
}

/// Provides the dashboard snapshot the generator draws from. Wired over the
/// bond manager and emotion registry at startup.
#[async_trait::async_trait]
pub trait StateSnapshot: Send + Sync {
    async fn trigger_context(&self) -> DomainResult<Option<TriggerContext>>;
}

pub struct RareEventGenerator {
    repo: Arc<dyn RareEventRepository>,
    snapshot: Arc<dyn StateSnapshot>,
    config: RareEventGeneratorConfig,
    user_id: String,
    running: Arc<AtomicBool>,
}

impl RareEventGenerator {
    pub fn new(
        repo: Arc<dyn RareEventRepository>,
        snapshot: Arc<dyn StateSnapshot>,
        config: RareEventGeneratorConfig,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            snapshot,
            config,
            user_id: user_id.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn start(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        let generator = self.clone();
        tracing::info!(
            interval_secs = generator.config.check_interval.as_secs(),
            "Rare-event generator started"
        );

        tokio::spawn(async move {
            while generator.running.load(Ordering::SeqCst) {
                if let Err(e) = generator.check_and_generate().await {
                    tracing::error!(error = %e, "Rare-event generation pass failed");
                }
                tokio::time::sleep(generator.config.check_interval).await;
            }
            tracing::info!("Rare-event generator stopped");
        })
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// One generation pass.
    pub async fn check_and_generate(&self) -> DomainResult<Option<RareEvent>> {
        if !self.cooldown_passed().await? || self.daily_limit_reached().await? {
            return Ok(None);
        }

        let Some(context) = self.snapshot.trigger_context().await? else {
            return Ok(None);
        };

        let Some(event_type) = self.evaluate_triggers(&context) else {
            return Ok(None);
        };

        let event = self.create_event(event_type, &context).await?;
        Ok(Some(event))
    }

    async fn cooldown_passed(&self) -> DomainResult<bool> {
        let Some(latest) = self.repo.latest_for_user(&self.user_id).await? else {
            return Ok(true);
        };
        let cutoff = Utc::now() - chrono::Duration::minutes(self.config.cooldown_minutes);
        Ok(latest.created_at < cutoff)
    }

    async fn daily_limit_reached(&self) -> DomainResult<bool> {
        let today_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or_else(Utc::now);
        let count = self.repo.count_since(&self.user_id, today_start).await?;
        Ok(count as usize >= self.config.daily_event_limit)
    }

    /// Enumerate candidates with context-modulated probabilities, then draw
    /// each independently; the first success wins.
    fn evaluate_triggers(&self, ctx: &TriggerContext) -> Option<RareEventType> {
        let candidates = self.candidates(ctx);
        let mut rng = rand::thread_rng();
        for (event_type, probability) in candidates {
            if rng.gen::<f64>() < probability {
                return Some(event_type);
            }
        }
        None
    }

    fn candidates(&self, ctx: &TriggerContext) -> Vec<(RareEventType, f64)> {
        // Higher bond makes everything more likely.
        let bond_modifier = ctx.affection_level / 100.0;
        let mut candidates = Vec::new();

        // Greeting: morning or evening, user around, decent bond.
        if (ctx.is_morning || ctx.is_evening) && !ctx.is_idle && ctx.affection_level >= 30.0 {
            let mut prob = self.config.greeting_probability * bond_modifier;
            if ctx.is_morning {
                prob *= 1.3;
            }
            candidates.push((RareEventType::Greeting, prob));
        }

        // Note: needs a minimum bond, more likely while productive.
        if ctx.affection_level >= self.config.min_bond_for_notes {
            let mut prob = self.config.note_probability * bond_modifier;
            if ctx.activity_category == "productive" {
                prob *= 1.2;
            }
            candidates.push((RareEventType::Note, prob));
        }

        // Observation: noticing activity patterns, boosted by long idle.
        if ctx.affection_level >= 35.0 {
            let mut prob = self.config.observation_probability * bond_modifier;
            if ctx.idle_minutes > 30 {
                prob *= 1.3;
            }
            candidates.push((RareEventType::Observation, prob));
        }

        // Mood shift: strong current emotion.
        if ctx.emotion_intensity > 0.6 {
            let prob =
                self.config.mood_shift_probability * bond_modifier * ctx.emotion_intensity;
            candidates.push((RareEventType::MoodShift, prob));
        }

        // Memory: high bond, boosted at reflective times.
        if ctx.affection_level >= self.config.min_bond_for_memory {
            let mut prob = self.config.memory_probability * bond_modifier;
            if matches!(ctx.weekday, Weekday::Sat | Weekday::Sun) || ctx.is_evening {
                prob *= 1.5;
            }
            candidates.push((RareEventType::Memory, prob));
        }

        candidates
    }

    async fn create_event(
        &self,
        event_type: RareEventType,
        ctx: &TriggerContext,
    ) -> DomainResult<RareEvent> {
        let trigger_context = serde_json::json!({
            "affection_level": ctx.affection_level,
            "bond_trend": ctx.bond_trend,
            "streak_days": ctx.streak_days,
            "emotion_type": ctx.emotion_type,
            "emotion_intensity": ctx.emotion_intensity,
            "activity_category": ctx.activity_category,
            "hour": ctx.hour,
        });

        let event = RareEvent::new(
            &self.user_id,
            event_type,
            content_hint(event_type, ctx),
            trigger_reason(event_type, ctx),
            trigger_context,
        );
        self.repo.insert(&event).await?;
        tracing::info!(
            event_type = event_type.as_str(),
            reason = %event.trigger_reason,
            "Created rare event"
        );
        Ok(event)
    }
}

fn trigger_reason(event_type: RareEventType, ctx: &TriggerContext) -> String {
    match event_type {
        RareEventType::Greeting => {
            let time_of_day = if ctx.is_morning { "morning" } else { "evening" };
            format!("{time_of_day} greeting, bond={:.0}", ctx.affection_level)
        }
        RareEventType::Note => format!("spontaneous note, activity={}", ctx.activity_category),
        RareEventType::Observation => {
            if ctx.idle_minutes > 30 {
                format!("noticed user idle for {} minutes", ctx.idle_minutes)
            } else {
                format!("activity observation: {}", ctx.activity_category)
            }
        }
        RareEventType::MoodShift => format!(
            "emotion spike: {} at {:.1}",
            ctx.emotion_type, ctx.emotion_intensity
        ),
        RareEventType::Memory => format!(
            "memory surfaced, streak={}, bond={:.0}",
            ctx.streak_days, ctx.affection_level
        ),
    }
}

/// Structured hint for later rendering by the personality layer.
fn content_hint(event_type: RareEventType, ctx: &TriggerContext) -> serde_json::Value {
    let warmth = if ctx.affection_level >= 70.0 { "high" } else { "medium" };
    match event_type {
        RareEventType::Greeting => serde_json::json!({
            "type": "greeting",
            "time_of_day": if ctx.is_morning { "morning" } else { "evening" },
            "warmth": warmth,
        }),
        RareEventType::Note => serde_json::json!({
            "type": "note",
            "activity_context": ctx.activity_category,
            "tone": if ctx.bond_trend == "rising" { "encouraging" } else { "neutral" },
        }),
        RareEventType::Observation => serde_json::json!({
            "type": "observation",
            "idle_minutes": ctx.idle_minutes,
            "activity": ctx.activity_category,
        }),
        RareEventType::MoodShift => serde_json::json!({
            "type": "mood_shift",
            "emotion": ctx.emotion_type,
            "intensity": ctx.emotion_intensity,
        }),
        RareEventType::Memory => serde_json::json!({
            "type": "memory",
            "streak_days": ctx.streak_days,
            "warmth": warmth,
        }),
    }
}
