//! Bond engine integration tests: decay, interaction growth, streaks, and
//! the bounds invariant.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};
use dere::adapters::sqlite::SqliteAffectRepository;
use dere::domain::models::{BondState, InteractionQuality};
use dere::domain::ports::AffectRepository;
use dere::services::{BondConfig, BondManager};
use proptest::prelude::*;

async fn setup() -> (Arc<SqliteAffectRepository>, BondManager) {
    let pool = common::test_pool().await;
    let repo = Arc::new(SqliteAffectRepository::new(pool));
    let manager = BondManager::new(repo.clone(), BondConfig::default(), "u");
    (repo, manager)
}

async fn seed(repo: &SqliteAffectRepository, manager: &BondManager, state: BondState) {
    repo.save_bond(&state).await.unwrap();
    manager.invalidate_cache().await;
}

#[tokio::test]
async fn decay_then_meaningful_interaction() {
    let (repo, manager) = setup().await;

    // Start from affection 60 with the last interaction 24h ago.
    let mut state = BondState::new("u", 60.0);
    state.last_interaction_at = Utc::now() - Duration::hours(24);
    seed(&repo, &manager, state).await;

    let decay = manager.apply_decay().await.unwrap().expect("decay after 24h");
    assert!(decay.new_affection < 60.0, "decay strictly decreases");
    assert!(decay.new_affection >= 0.0);

    let before = manager.get_state().await.unwrap();
    let update = manager
        .record_interaction(InteractionQuality::Meaningful, Some(20.0))
        .await
        .unwrap();
    assert!(update.new_affection > before.affection_level, "interaction increases affection");

    let after = manager.get_state().await.unwrap();
    assert!(after.last_meaningful_at.is_some());
    // New calendar day of interaction starts a streak of one.
    assert_eq!(after.streak_days, 1);
    assert_eq!(after.streak_last_date, Some(Utc::now().date_naive()));
}

#[tokio::test]
async fn same_day_second_interaction_keeps_streak() {
    let (_, manager) = setup().await;
    manager.record_interaction(InteractionQuality::Meaningful, Some(20.0)).await.unwrap();
    let first = manager.get_state().await.unwrap().streak_days;
    manager.record_interaction(InteractionQuality::Meaningful, Some(20.0)).await.unwrap();
    let second = manager.get_state().await.unwrap().streak_days;
    assert_eq!(first, second, "same-day interactions keep the streak");
}

#[tokio::test]
async fn decay_only_step_never_increases() {
    let (repo, manager) = setup().await;

    for start in [5.0, 30.0, 55.0, 99.0] {
        let mut state = BondState::new("u", start);
        state.last_interaction_at = Utc::now() - Duration::hours(48);
        seed(&repo, &manager, state).await;

        if let Some(update) = manager.apply_decay().await.unwrap() {
            assert!(update.new_affection <= start, "decay from {start} must not increase");
            assert!(update.new_affection >= 0.0);
        }
    }
}

#[tokio::test]
async fn affection_stays_in_bounds_under_many_interactions() {
    let (_, manager) = setup().await;
    for _ in 0..50 {
        let update = manager
            .record_interaction(InteractionQuality::Exceptional, Some(120.0))
            .await
            .unwrap();
        assert!(update.new_affection <= 100.0);
        assert!(update.new_affection >= 0.0);
    }
    let state = manager.get_state().await.unwrap();
    assert!(state.affection_level <= 100.0);
}

proptest! {
    // The decay curve itself respects the bounds for any affection level
    // and elapsed time: new = old - old * (1 - exp(-rate * hours / 100)).
    #[test]
    fn decay_formula_bounded(affection in 0.0_f64..=100.0, hours in 0.0_f64..=720.0) {
        let config = BondConfig::default();
        let rate = if affection < config.decay_acceleration_threshold {
            let factor = 1.0
                + (config.decay_acceleration_threshold - affection)
                    / config.decay_acceleration_threshold;
            (config.base_decay_rate * factor).min(config.max_decay_rate)
        } else {
            config.base_decay_rate
        };
        let decay_amount = affection * (1.0 - (-rate * hours / 100.0).exp());
        let new_affection = (affection - decay_amount).max(0.0);

        prop_assert!(new_affection >= 0.0);
        prop_assert!(new_affection <= affection);
        prop_assert!(new_affection <= 100.0);
    }

    // The gain path is similarly bounded: no combination of quality,
    // duration, and streak pushes affection past the cap.
    #[test]
    fn gain_formula_bounded(
        affection in 0.0_f64..=100.0,
        base_gain in 0.5_f64..=8.0,
        duration in 0.0_f64..=600.0,
        streak in 0u32..=365,
    ) {
        let config = BondConfig::default();
        let mut gain = base_gain;
        if duration > 5.0 {
            gain += ((duration / 5.0).ln() * 0.5).min(3.0);
        }
        let streak_bonus =
            (f64::from(streak) * config.streak_bonus_multiplier).min(config.max_streak_bonus);
        let mut total = gain * (1.0 + streak_bonus);
        if affection > 80.0 {
            total *= (1.0 - (affection - 80.0) / 40.0).max(0.2);
        }
        let new_affection = (affection + total).min(100.0);

        prop_assert!(new_affection >= affection);
        prop_assert!(new_affection <= 100.0);
    }
}
