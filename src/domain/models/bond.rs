//! Bond domain model.
//!
//! The bond tracks her affection toward one user over time: decay from
//! absence, growth from interactions, streak bonuses for consistency.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Coarse classifier of recent affection movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BondTrend {
    Rising,
    Stable,
    Falling,
    Distant,
}

impl BondTrend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rising => "rising",
            Self::Stable => "stable",
            Self::Falling => "falling",
            Self::Distant => "distant",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rising" => Some(Self::Rising),
            "stable" => Some(Self::Stable),
            "falling" => Some(Self::Falling),
            "distant" => Some(Self::Distant),
            _ => None,
        }
    }
}

/// Quality classification for an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionQuality {
    /// Short, transactional exchanges
    Minimal,
    /// Normal conversation
    Standard,
    /// Extended engagement, personal topics
    Meaningful,
    /// Deep connection, vulnerability, creativity
    Exceptional,
}

impl InteractionQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Standard => "standard",
            Self::Meaningful => "meaningful",
            Self::Exceptional => "exceptional",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "standard" => Some(Self::Standard),
            "meaningful" => Some(Self::Meaningful),
            "exceptional" => Some(Self::Exceptional),
            _ => None,
        }
    }

    pub fn is_meaningful(&self) -> bool {
        matches!(self, Self::Meaningful | Self::Exceptional)
    }
}

/// One point in the affection history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectionSample {
    pub timestamp: DateTime<Utc>,
    pub affection: f64,
    pub reason: String,
}

/// Persisted per-user bond state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondState {
    pub user_id: String,
    /// 0..=100
    pub affection_level: f64,
    pub trend: BondTrend,
    pub last_interaction_at: DateTime<Utc>,
    pub last_meaningful_at: Option<DateTime<Utc>>,
    pub streak_days: u32,
    pub streak_last_date: Option<NaiveDate>,
    pub affection_history: Vec<AffectionSample>,
}

impl BondState {
    pub fn new(user_id: impl Into<String>, starting_affection: f64) -> Self {
        Self {
            user_id: user_id.into(),
            affection_level: starting_affection,
            trend: BondTrend::Stable,
            last_interaction_at: Utc::now(),
            last_meaningful_at: None,
            streak_days: 0,
            streak_last_date: None,
            affection_history: Vec::new(),
        }
    }
}

/// Result of a bond mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BondUpdate {
    pub old_affection: f64,
    pub new_affection: f64,
    pub old_trend: BondTrend,
    pub new_trend: BondTrend,
    pub delta: f64,
    pub streak_days: u32,
    pub reasoning: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_classification() {
        assert!(InteractionQuality::Meaningful.is_meaningful());
        assert!(InteractionQuality::Exceptional.is_meaningful());
        assert!(!InteractionQuality::Standard.is_meaningful());
    }

    #[test]
    fn trend_round_trip() {
        for t in [BondTrend::Rising, BondTrend::Stable, BondTrend::Falling, BondTrend::Distant] {
            assert_eq!(BondTrend::from_str(t.as_str()), Some(t));
        }
    }
}
