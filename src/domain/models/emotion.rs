//! OCC emotion domain model.
//!
//! The taxonomy follows the revised OCC hierarchy (Ortony, Clore, Collins as
//! restructured by Steunebrink, Dastani & Meyer): event consequences, agent
//! actions, object aspects, plus four compound emotions and a neutral
//! utility type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The OCC emotion taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmotionType {
    // Event consequences, prospective
    Hope,
    Fear,
    // Event consequences, actual (self)
    Joy,
    Distress,
    // Prospect confirmation / disconfirmation
    Satisfaction,
    Relief,
    FearsConfirmed,
    Disappointment,
    // Fortune of others
    HappyFor,
    Pity,
    Gloating,
    Resentment,
    // Agent actions
    Pride,
    Shame,
    Admiration,
    Reproach,
    // Object aspects
    Love,
    Hate,
    Interest,
    Disgust,
    // Compounds
    Gratitude,
    Anger,
    Gratification,
    Remorse,
    // Utility
    Neutral,
}

/// Valence of an emotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Valence {
    Positive,
    Negative,
    Neutral,
}

/// Arousal band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arousal {
    High,
    Medium,
    Low,
}

/// How strongly an emotion persists once present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persistence {
    Sticky,
    Normal,
    Fleeting,
}

/// How socially coupled an emotion is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocialRelevance {
    High,
    Medium,
    Low,
}

/// Psychological characteristics governing emotion dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionCharacteristics {
    pub valence: Valence,
    pub arousal: Arousal,
    pub persistence: Persistence,
    pub social_relevance: SocialRelevance,
}

impl EmotionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hope => "hope",
            Self::Fear => "fear",
            Self::Joy => "joy",
            Self::Distress => "distress",
            Self::Satisfaction => "satisfaction",
            Self::Relief => "relief",
            Self::FearsConfirmed => "fears-confirmed",
            Self::Disappointment => "disappointment",
            Self::HappyFor => "happy-for",
            Self::Pity => "pity",
            Self::Gloating => "gloating",
            Self::Resentment => "resentment",
            Self::Pride => "pride",
            Self::Shame => "shame",
            Self::Admiration => "admiration",
            Self::Reproach => "reproach",
            Self::Love => "love",
            Self::Hate => "hate",
            Self::Interest => "interest",
            Self::Disgust => "disgust",
            Self::Gratitude => "gratitude",
            Self::Anger => "anger",
            Self::Gratification => "gratification",
            Self::Remorse => "remorse",
            Self::Neutral => "neutral",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "hope" => Some(Self::Hope),
            "fear" => Some(Self::Fear),
            "joy" => Some(Self::Joy),
            "distress" => Some(Self::Distress),
            "satisfaction" => Some(Self::Satisfaction),
            "relief" => Some(Self::Relief),
            "fears-confirmed" | "fears_confirmed" => Some(Self::FearsConfirmed),
            "disappointment" => Some(Self::Disappointment),
            "happy-for" | "happy_for" => Some(Self::HappyFor),
            "pity" => Some(Self::Pity),
            "gloating" => Some(Self::Gloating),
            "resentment" => Some(Self::Resentment),
            "pride" => Some(Self::Pride),
            "shame" => Some(Self::Shame),
            "admiration" => Some(Self::Admiration),
            "reproach" => Some(Self::Reproach),
            "love" => Some(Self::Love),
            "hate" => Some(Self::Hate),
            "interest" => Some(Self::Interest),
            "disgust" => Some(Self::Disgust),
            "gratitude" => Some(Self::Gratitude),
            "anger" => Some(Self::Anger),
            "gratification" => Some(Self::Gratification),
            "remorse" => Some(Self::Remorse),
            "neutral" => Some(Self::Neutral),
            _ => None,
        }
    }

    /// Psychological characteristics for the type.
    pub fn characteristics(&self) -> EmotionCharacteristics {
        use Arousal as A;
        use Persistence as P;
        use SocialRelevance as S;
        use Valence as V;
        let c = |valence, arousal, persistence, social_relevance| EmotionCharacteristics {
            valence,
            arousal,
            persistence,
            social_relevance,
        };
        match self {
            Self::Joy => c(V::Positive, A::High, P::Normal, S::Medium),
            Self::Hope => c(V::Positive, A::Medium, P::Sticky, S::Low),
            Self::Satisfaction => c(V::Positive, A::Medium, P::Normal, S::Low),
            Self::Relief => c(V::Positive, A::Low, P::Fleeting, S::Low),
            Self::HappyFor => c(V::Positive, A::Medium, P::Normal, S::High),
            Self::Pride => c(V::Positive, A::Medium, P::Sticky, S::Medium),
            Self::Admiration => c(V::Positive, A::Low, P::Normal, S::High),
            Self::Love => c(V::Positive, A::Medium, P::Sticky, S::High),
            Self::Gratitude => c(V::Positive, A::Medium, P::Sticky, S::High),
            Self::Gratification => c(V::Positive, A::High, P::Normal, S::Low),
            Self::Interest => c(V::Positive, A::Medium, P::Normal, S::Low),
            Self::Distress => c(V::Negative, A::High, P::Sticky, S::Medium),
            Self::Fear => c(V::Negative, A::High, P::Sticky, S::Low),
            Self::Disappointment => c(V::Negative, A::Medium, P::Normal, S::Low),
            Self::FearsConfirmed => c(V::Negative, A::High, P::Sticky, S::Low),
            Self::Pity => c(V::Negative, A::Low, P::Normal, S::High),
            Self::Gloating => c(V::Negative, A::Medium, P::Fleeting, S::High),
            Self::Resentment => c(V::Negative, A::Medium, P::Sticky, S::High),
            Self::Shame => c(V::Negative, A::Medium, P::Sticky, S::High),
            Self::Reproach => c(V::Negative, A::Medium, P::Normal, S::High),
            Self::Hate => c(V::Negative, A::High, P::Sticky, S::High),
            Self::Anger => c(V::Negative, A::High, P::Normal, S::High),
            Self::Remorse => c(V::Negative, A::Medium, P::Sticky, S::Medium),
            Self::Disgust => c(V::Negative, A::Medium, P::Normal, S::Low),
            Self::Neutral => c(V::Neutral, A::Low, P::Normal, S::Low),
        }
    }
}

/// One active emotion with its intensity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionInstance {
    #[serde(rename = "type")]
    pub emotion_type: EmotionType,
    /// Intensity in [0, 100].
    pub intensity: f64,
    pub last_updated: DateTime<Utc>,
}

impl EmotionInstance {
    pub fn new(emotion_type: EmotionType, intensity: f64) -> Self {
        Self {
            emotion_type,
            intensity: intensity.clamp(0.0, 100.0),
            last_updated: Utc::now(),
        }
    }
}

/// Event-consequence appraisal dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutcome {
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub prospect: Option<String>,
    #[serde(default)]
    pub affected_goals: Vec<String>,
    /// -10..=10
    #[serde(default)]
    pub desirability: f64,
}

/// Agent-action appraisal dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentAction {
    #[serde(default)]
    pub agent: Option<String>,
    #[serde(default)]
    pub judgement: Option<String>,
    #[serde(default)]
    pub affected_standards: Vec<String>,
    /// -10..=10
    #[serde(default)]
    pub praiseworthiness: f64,
}

/// Object-aspect appraisal dimension.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectAttribute {
    #[serde(default)]
    pub familiarity: Option<String>,
    #[serde(default)]
    pub judgement: Option<String>,
    #[serde(default)]
    pub affected_attitudes: Vec<String>,
    /// -10..=10
    #[serde(default)]
    pub appealingness: f64,
}

/// One emotion produced by the appraisal helper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppraisedEmotion {
    #[serde(rename = "type")]
    pub emotion_type: EmotionType,
    pub intensity: f64,
    #[serde(default)]
    pub eliciting: Option<String>,
}

/// Structured appraisal of a stimulus along the OCC dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppraisalOutput {
    #[serde(default)]
    pub event_outcome: Option<EventOutcome>,
    #[serde(default)]
    pub agent_action: Option<AgentAction>,
    #[serde(default)]
    pub object_attribute: Option<ObjectAttribute>,
    #[serde(default)]
    pub resulting_emotions: Vec<AppraisedEmotion>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// Simplified current mood for external consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentMood {
    pub dominant_emotion_type: EmotionType,
    /// 0..=100
    pub intensity: f64,
    pub last_updated: DateTime<Utc>,
}

/// A recorded stimulus for the bounded history FIFO.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusRecord {
    pub stimulus_type: String,
    /// -10..=10
    pub valence: f64,
    /// 0..=100
    pub intensity: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Persisted per-session emotional state snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionState {
    pub session_id: uuid::Uuid,
    pub active_emotions: Vec<EmotionInstance>,
    pub primary_type: EmotionType,
    pub primary_intensity: f64,
    pub secondary_type: Option<EmotionType>,
    pub secondary_intensity: Option<f64>,
    pub overall_intensity: f64,
    pub last_decay_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    #[serde(default)]
    pub appraisal_snapshot: Option<serde_json::Value>,
    #[serde(default)]
    pub trigger_snapshot: Option<serde_json::Value>,
}

impl EmotionState {
    pub fn empty(session_id: uuid::Uuid) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            active_emotions: Vec::new(),
            primary_type: EmotionType::Neutral,
            primary_intensity: 0.0,
            secondary_type: None,
            secondary_intensity: None,
            overall_intensity: 0.0,
            last_decay_at: now,
            last_update: now,
            appraisal_snapshot: None,
            trigger_snapshot: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_round_trip() {
        for t in [
            EmotionType::Hope,
            EmotionType::FearsConfirmed,
            EmotionType::HappyFor,
            EmotionType::Remorse,
            EmotionType::Neutral,
        ] {
            assert_eq!(EmotionType::from_str(t.as_str()), Some(t));
        }
    }

    #[test]
    fn serde_uses_kebab_case() {
        let json = serde_json::to_string(&EmotionType::FearsConfirmed).unwrap();
        assert_eq!(json, "\"fears-confirmed\"");
        let back: EmotionType = serde_json::from_str("\"happy-for\"").unwrap();
        assert_eq!(back, EmotionType::HappyFor);
    }

    #[test]
    fn characteristics_valence_split() {
        assert_eq!(EmotionType::Joy.characteristics().valence, Valence::Positive);
        assert_eq!(EmotionType::Anger.characteristics().valence, Valence::Negative);
        assert_eq!(EmotionType::Neutral.characteristics().valence, Valence::Neutral);
    }

    #[test]
    fn instance_clamps_intensity() {
        assert!((EmotionInstance::new(EmotionType::Joy, 150.0).intensity - 100.0).abs() < f64::EPSILON);
        assert!(EmotionInstance::new(EmotionType::Joy, -5.0).intensity.abs() < f64::EPSILON);
    }
}
