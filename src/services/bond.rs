//! Bond manager.
//!
//! Tracks her affection toward one user: absence decays it, interactions
//! grow it, daily streaks amplify the growth. All mutations recompute the
//! trend and append a history sample. The in-memory cache exists for
//! hot-path reads only; the store stays canonical.

use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    AffectionSample, BondState, BondTrend, BondUpdate, InteractionQuality,
};
use crate::domain::ports::AffectRepository;

#[derive(Debug, Clone)]
pub struct BondConfig {
    /// Affection points lost per hour when absent.
    pub base_decay_rate: f64,
    /// Ceiling on the accelerated decay rate at low bond levels.
    pub max_decay_rate: f64,
    /// Below this level, decay accelerates.
    pub decay_acceleration_threshold: f64,

    pub minimal_interaction_gain: f64,
    pub standard_interaction_gain: f64,
    pub meaningful_interaction_gain: f64,
    pub exceptional_interaction_gain: f64,

    /// Gain multiplier added per streak day.
    pub streak_bonus_multiplier: f64,
    pub max_streak_bonus: f64,
    /// Affection lost when a streak breaks.
    pub streak_break_penalty: f64,

    pub min_affection: f64,
    pub max_affection: f64,
    pub starting_affection: f64,

    pub trend_window_days: i64,
    pub rising_threshold: f64,
    pub falling_threshold: f64,
    /// Absolute level below which the trend reads distant.
    pub distant_threshold: f64,

    /// History retention window in days.
    pub history_retention_days: i64,
}

impl Default for BondConfig {
    fn default() -> Self {
        Self {
            base_decay_rate: 0.5,
            max_decay_rate: 2.0,
            decay_acceleration_threshold: 30.0,
            minimal_interaction_gain: 0.5,
            standard_interaction_gain: 1.5,
            meaningful_interaction_gain: 4.0,
            exceptional_interaction_gain: 8.0,
            streak_bonus_multiplier: 0.1,
            max_streak_bonus: 0.5,
            streak_break_penalty: 5.0,
            min_affection: 0.0,
            max_affection: 100.0,
            starting_affection: 50.0,
            trend_window_days: 7,
            rising_threshold: 5.0,
            falling_threshold: -5.0,
            distant_threshold: 20.0,
            history_retention_days: 30,
        }
    }
}

pub struct BondManager {
    repo: Arc<dyn AffectRepository>,
    config: BondConfig,
    user_id: String,
    cached: Mutex<Option<BondState>>,
}

impl BondManager {
    pub fn new(repo: Arc<dyn AffectRepository>, config: BondConfig, user_id: impl Into<String>) -> Self {
        Self { repo, config, user_id: user_id.into(), cached: Mutex::new(None) }
    }

    /// Current bond state, creating the row on first use.
    pub async fn get_state(&self) -> DomainResult<BondState> {
        if let Some(state) = self.cached.lock().await.clone() {
            return Ok(state);
        }
        let state = match self.repo.load_bond(&self.user_id).await? {
            Some(state) => state,
            None => {
                let state = BondState::new(&self.user_id, self.config.starting_affection);
                self.repo.save_bond(&state).await?;
                tracing::info!(user_id = %self.user_id, "Created new bond state");
                state
            }
        };
        *self.cached.lock().await = Some(state.clone());
        Ok(state)
    }

    /// Apply time-based decay. Returns `None` when no significant decay
    /// occurred (under 30 minutes elapsed or a sub-0.01 change).
    pub async fn apply_decay(&self) -> DomainResult<Option<BondUpdate>> {
        let mut state = self.get_state().await?;
        let now = Utc::now();

        let hours_elapsed =
            (now - state.last_interaction_at).num_seconds() as f64 / 3600.0;
        if hours_elapsed < 0.5 {
            return Ok(None);
        }

        let old_affection = state.affection_level;

        // Decay accelerates at low bond levels.
        let decay_rate = if old_affection < self.config.decay_acceleration_threshold {
            let factor = 1.0
                + (self.config.decay_acceleration_threshold - old_affection)
                    / self.config.decay_acceleration_threshold;
            (self.config.base_decay_rate * factor).min(self.config.max_decay_rate)
        } else {
            self.config.base_decay_rate
        };

        // Exponential curve, gentler than linear and never negative.
        let decay_amount =
            old_affection * (1.0 - (-decay_rate * hours_elapsed / 100.0).exp());
        let mut new_affection =
            (old_affection - decay_amount).max(self.config.min_affection);

        if (new_affection - old_affection).abs() < 0.01 {
            return Ok(None);
        }

        // Streak break: more than one calendar day since the last streak
        // date resets the streak and costs a fixed penalty.
        let mut streak_days = state.streak_days;
        let mut streak_broken = false;
        if let Some(last_date) = state.streak_last_date {
            let days_since = (now.date_naive() - last_date).num_days();
            if days_since > 1 {
                streak_broken = true;
                streak_days = 0;
                new_affection =
                    (new_affection - self.config.streak_break_penalty).max(self.config.min_affection);
                tracing::info!(
                    user_id = %self.user_id,
                    previous_streak = state.streak_days,
                    "Streak broken, penalty applied"
                );
            }
        }

        let old_trend = state.trend;
        let new_trend = self.calculate_trend(&state, new_affection);

        let previous_streak = state.streak_days;
        state.affection_level = new_affection;
        state.trend = new_trend;
        state.streak_days = streak_days;
        self.record_history(&mut state, new_affection, "decay");
        self.save(&state).await?;

        let mut reasoning = format!("Decay after {hours_elapsed:.1}h absence");
        if streak_broken {
            reasoning.push_str(&format!(", streak broken (was {previous_streak} days)"));
        }

        tracing::debug!(
            user_id = %self.user_id,
            old = old_affection,
            new = new_affection,
            rate = decay_rate,
            hours = hours_elapsed,
            "Bond decay applied"
        );

        Ok(Some(BondUpdate {
            old_affection,
            new_affection,
            old_trend,
            new_trend,
            delta: new_affection - old_affection,
            streak_days,
            reasoning,
        }))
    }

    /// Record an interaction: pending decay first, then a quality-dependent
    /// gain with duration and streak bonuses, diminishing above a high bond.
    pub async fn record_interaction(
        &self,
        quality: InteractionQuality,
        duration_minutes: Option<f64>,
    ) -> DomainResult<BondUpdate> {
        self.apply_decay().await?;

        let mut state = self.get_state().await?;
        let now = Utc::now();
        let old_affection = state.affection_level;

        let mut base_gain = match quality {
            InteractionQuality::Minimal => self.config.minimal_interaction_gain,
            InteractionQuality::Standard => self.config.standard_interaction_gain,
            InteractionQuality::Meaningful => self.config.meaningful_interaction_gain,
            InteractionQuality::Exceptional => self.config.exceptional_interaction_gain,
        };

        // Logarithmic duration bonus above five minutes, capped.
        if let Some(minutes) = duration_minutes {
            if minutes > 5.0 {
                let bonus = (minutes / 5.0).ln() * 0.5;
                base_gain += bonus.min(3.0);
            }
        }

        let streak_bonus = (f64::from(state.streak_days) * self.config.streak_bonus_multiplier)
            .min(self.config.max_streak_bonus);
        let mut total_gain = base_gain * (1.0 + streak_bonus);

        // Diminishing returns at high affection.
        if old_affection > 80.0 {
            let diminish = 1.0 - (old_affection - 80.0) / 40.0;
            total_gain *= diminish.max(0.2);
        }

        let new_affection = (old_affection + total_gain).min(self.config.max_affection);

        // Streak bookkeeping: same day is neutral, a consecutive day
        // extends, a gap restarts at one (the gap itself was penalised in
        // decay).
        let today = now.date_naive();
        match state.streak_last_date {
            Some(last_date) => match (today - last_date).num_days() {
                0 => {}
                1 => {
                    state.streak_days += 1;
                    tracing::info!(
                        user_id = %self.user_id,
                        streak = state.streak_days,
                        "Streak extended"
                    );
                }
                _ => state.streak_days = 1,
            },
            None => state.streak_days = 1,
        }
        state.streak_last_date = Some(today);

        if quality.is_meaningful() {
            state.last_meaningful_at = Some(now);
        }

        let old_trend = state.trend;
        let new_trend = self.calculate_trend(&state, new_affection);

        state.affection_level = new_affection;
        state.trend = new_trend;
        state.last_interaction_at = now;
        self.record_history(&mut state, new_affection, quality.as_str());
        self.save(&state).await?;

        tracing::info!(
            user_id = %self.user_id,
            quality = quality.as_str(),
            old = old_affection,
            new = new_affection,
            gain = total_gain,
            streak = state.streak_days,
            "Interaction recorded"
        );

        Ok(BondUpdate {
            old_affection,
            new_affection,
            old_trend,
            new_trend,
            delta: total_gain,
            streak_days: state.streak_days,
            reasoning: format!("{} interaction (+{total_gain:.1})", quality.as_str()),
        })
    }

    /// Context injection sentence describing the current bond.
    pub async fn context_summary(&self) -> DomainResult<String> {
        let state = self.get_state().await?;
        let affection = state.affection_level;

        let base = if affection >= 85.0 {
            "feeling deeply connected and appreciated"
        } else if affection >= 70.0 {
            "feeling close and comfortable"
        } else if affection >= 55.0 {
            "feeling generally positive"
        } else if affection >= 40.0 {
            "feeling a bit distant"
        } else if affection >= 25.0 {
            "feeling neglected and withdrawn"
        } else {
            "feeling very distant and hurt"
        };

        let trend_mod = match state.trend {
            BondTrend::Rising => ", growing closer",
            BondTrend::Falling => ", pulling away slightly",
            BondTrend::Distant => ", emotionally guarded",
            BondTrend::Stable => "",
        };

        let streak_note = if state.streak_days >= 7 {
            format!(" ({}-day streak of daily connection)", state.streak_days)
        } else if state.streak_days >= 3 {
            format!(" (maintaining a {}-day streak)", state.streak_days)
        } else {
            String::new()
        };

        Ok(format!("Current bond state: {base}{trend_mod}{streak_note}."))
    }

    /// Modifiers for personality/response generation: factors in [0, 1]
    /// derived from the affection level and streak.
    pub async fn disposition_modifiers(&self) -> DomainResult<Vec<(&'static str, f64)>> {
        let state = self.get_state().await?;
        let affection = state.affection_level / 100.0;
        let streak_bonus = (f64::from(state.streak_days) * 0.02).min(0.2);

        Ok(vec![
            ("warmth", 0.3 + affection * 0.7),
            ("openness", 0.2 + affection * 0.6 + streak_bonus),
            ("playfulness", 0.4 + affection * 0.4),
            ("patience", 0.5 + affection * 0.3),
            ("initiative", 0.3 + affection * 0.5),
        ])
    }

    fn calculate_trend(&self, state: &BondState, current_affection: f64) -> BondTrend {
        if current_affection < self.config.distant_threshold {
            return BondTrend::Distant;
        }

        if state.affection_history.len() < 2 {
            return BondTrend::Stable;
        }

        let cutoff = Utc::now() - Duration::days(self.config.trend_window_days);
        let recent: Vec<&AffectionSample> =
            state.affection_history.iter().filter(|s| s.timestamp > cutoff).collect();
        if recent.len() < 2 {
            return BondTrend::Stable;
        }

        let net_change = current_affection - recent[0].affection;
        if net_change >= self.config.rising_threshold {
            BondTrend::Rising
        } else if net_change <= self.config.falling_threshold {
            BondTrend::Falling
        } else {
            BondTrend::Stable
        }
    }

    fn record_history(&self, state: &mut BondState, affection: f64, reason: &str) {
        let now = Utc::now();
        state.affection_history.push(AffectionSample {
            timestamp: now,
            affection,
            reason: reason.to_string(),
        });
        let cutoff = now - Duration::days(self.config.history_retention_days);
        state.affection_history.retain(|s| s.timestamp > cutoff);
    }

    async fn save(&self, state: &BondState) -> DomainResult<()> {
        self.repo.save_bond(state).await?;
        *self.cached.lock().await = Some(state.clone());
        Ok(())
    }

    /// Drop the cache after external writes.
    pub async fn invalidate_cache(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteAffectRepository};

    async fn manager() -> BondManager {
        let pool = create_migrated_test_pool().await.unwrap();
        BondManager::new(Arc::new(SqliteAffectRepository::new(pool)), BondConfig::default(), "u")
    }

    async fn backdate(manager: &BondManager, hours: i64) {
        let mut state = manager.get_state().await.unwrap();
        state.last_interaction_at = Utc::now() - Duration::hours(hours);
        manager.repo.save_bond(&state).await.unwrap();
        manager.invalidate_cache().await;
    }

    #[tokio::test]
    async fn starts_at_configured_affection() {
        let manager = manager().await;
        let state = manager.get_state().await.unwrap();
        assert!((state.affection_level - 50.0).abs() < f64::EPSILON);
        assert_eq!(state.trend, BondTrend::Stable);
    }

    #[tokio::test]
    async fn decay_skipped_when_recent() {
        let manager = manager().await;
        assert!(manager.apply_decay().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn decay_strictly_decreases_and_stays_bounded() {
        let manager = manager().await;
        backdate(&manager, 24).await;

        let update = manager.apply_decay().await.unwrap().unwrap();
        assert!(update.new_affection < update.old_affection);
        assert!(update.new_affection >= 0.0);
    }

    #[tokio::test]
    async fn interaction_increases_and_sets_meaningful() {
        let manager = manager().await;
        backdate(&manager, 24).await;
        manager.apply_decay().await.unwrap();

        let before = manager.get_state().await.unwrap().affection_level;
        let update = manager
            .record_interaction(InteractionQuality::Meaningful, Some(20.0))
            .await
            .unwrap();
        assert!(update.new_affection > before);

        let state = manager.get_state().await.unwrap();
        assert!(state.last_meaningful_at.is_some());
        assert_eq!(state.streak_days, 1);
    }

    #[tokio::test]
    async fn same_day_interactions_keep_streak() {
        let manager = manager().await;
        manager.record_interaction(InteractionQuality::Standard, None).await.unwrap();
        manager.record_interaction(InteractionQuality::Standard, None).await.unwrap();
        let state = manager.get_state().await.unwrap();
        assert_eq!(state.streak_days, 1);
    }

    #[tokio::test]
    async fn consecutive_day_extends_streak() {
        let manager = manager().await;
        manager.record_interaction(InteractionQuality::Standard, None).await.unwrap();

        let mut state = manager.get_state().await.unwrap();
        state.streak_last_date = Some(Utc::now().date_naive() - Duration::days(1));
        manager.repo.save_bond(&state).await.unwrap();
        manager.invalidate_cache().await;

        manager.record_interaction(InteractionQuality::Standard, None).await.unwrap();
        let state = manager.get_state().await.unwrap();
        assert_eq!(state.streak_days, 2);
    }

    #[tokio::test]
    async fn gap_resets_streak_with_penalty() {
        let manager = manager().await;
        manager.record_interaction(InteractionQuality::Standard, None).await.unwrap();

        let mut state = manager.get_state().await.unwrap();
        state.streak_days = 5;
        state.streak_last_date = Some(Utc::now().date_naive() - Duration::days(3));
        state.last_interaction_at = Utc::now() - Duration::hours(72);
        let affection_before = state.affection_level;
        manager.repo.save_bond(&state).await.unwrap();
        manager.invalidate_cache().await;

        let update = manager.apply_decay().await.unwrap().unwrap();
        assert_eq!(update.streak_days, 0);
        // Penalty plus decay both pull downward.
        assert!(update.new_affection < affection_before);
    }

    #[tokio::test]
    async fn high_bond_gains_diminish() {
        let manager = manager().await;
        let mut state = manager.get_state().await.unwrap();
        state.affection_level = 95.0;
        manager.repo.save_bond(&state).await.unwrap();
        manager.invalidate_cache().await;

        let update =
            manager.record_interaction(InteractionQuality::Exceptional, None).await.unwrap();
        // Full gain would be 8.0; diminishing returns scale it down.
        assert!(update.delta < 8.0);
        assert!(update.new_affection <= 100.0);
    }

    #[tokio::test]
    async fn distant_trend_below_threshold() {
        let manager = manager().await;
        let mut state = manager.get_state().await.unwrap();
        state.affection_level = 15.0;
        state.last_interaction_at = Utc::now() - Duration::hours(2);
        manager.repo.save_bond(&state).await.unwrap();
        manager.invalidate_cache().await;

        let update = manager.apply_decay().await.unwrap().unwrap();
        assert_eq!(update.new_trend, BondTrend::Distant);
    }

    #[tokio::test]
    async fn context_summary_mentions_bond() {
        let manager = manager().await;
        let summary = manager.context_summary().await.unwrap();
        assert!(summary.starts_with("Current bond state:"));
    }
}
