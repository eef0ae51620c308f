//! Context-aware emotion decay.
//!
//! Each emotion type carries a decay profile (rate, half-life, minimum
//! persistence, resilience, context sensitivity). Context factors modulate
//! the effective rate; sticky emotions earn lower removal thresholds.

use crate::domain::models::{Arousal, EmotionInstance, EmotionType, Persistence, SocialRelevance, Valence};

/// Decay characteristics for an emotion type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecayProfile {
    /// Base decay rate per minute.
    pub base_decay_rate: f64,
    /// Minutes for intensity to halve.
    pub half_life: f64,
    /// Minutes before any decay starts.
    pub minimum_persistence: f64,
    /// How much the emotion resists decay (0-1).
    pub resilience: f64,
    /// How much external context affects decay (0-1).
    pub context_sensitivity: f64,
}

/// Decay profile per emotion type.
pub fn decay_profile(emotion: EmotionType) -> DecayProfile {
    let p = |base_decay_rate, half_life, minimum_persistence, resilience, context_sensitivity| {
        DecayProfile { base_decay_rate, half_life, minimum_persistence, resilience, context_sensitivity }
    };
    match emotion {
        // Positive emotions decay faster on the whole, but some are sticky.
        EmotionType::Joy => p(0.08, 12.0, 2.0, 0.3, 0.6),
        EmotionType::Hope => p(0.04, 25.0, 5.0, 0.6, 0.4),
        EmotionType::Satisfaction => p(0.06, 18.0, 3.0, 0.4, 0.5),
        EmotionType::Relief => p(0.12, 8.0, 1.0, 0.2, 0.7),
        EmotionType::HappyFor => p(0.07, 15.0, 2.0, 0.3, 0.8),
        EmotionType::Pride => p(0.03, 30.0, 10.0, 0.7, 0.3),
        EmotionType::Admiration => p(0.05, 20.0, 3.0, 0.4, 0.6),
        EmotionType::Love => p(0.01, 60.0, 15.0, 0.9, 0.2),
        EmotionType::Gratitude => p(0.04, 25.0, 5.0, 0.6, 0.5),
        EmotionType::Gratification => p(0.06, 18.0, 4.0, 0.4, 0.4),
        EmotionType::Interest => p(0.09, 10.0, 1.0, 0.3, 0.8),
        // Negative emotions tend to be stickier.
        EmotionType::Distress => p(0.03, 30.0, 8.0, 0.7, 0.5),
        EmotionType::Fear => p(0.02, 40.0, 10.0, 0.8, 0.3),
        EmotionType::Disappointment => p(0.05, 22.0, 5.0, 0.5, 0.6),
        EmotionType::FearsConfirmed => p(0.02, 45.0, 12.0, 0.8, 0.3),
        EmotionType::Pity => p(0.06, 18.0, 3.0, 0.4, 0.7),
        EmotionType::Gloating => p(0.1, 7.0, 1.0, 0.2, 0.8),
        EmotionType::Resentment => p(0.02, 50.0, 15.0, 0.8, 0.4),
        EmotionType::Shame => p(0.02, 45.0, 12.0, 0.8, 0.3),
        EmotionType::Reproach => p(0.04, 25.0, 6.0, 0.6, 0.5),
        EmotionType::Hate => p(0.01, 80.0, 20.0, 0.9, 0.2),
        EmotionType::Anger => p(0.06, 18.0, 4.0, 0.5, 0.6),
        EmotionType::Remorse => p(0.03, 35.0, 10.0, 0.7, 0.4),
        EmotionType::Disgust => p(0.05, 20.0, 4.0, 0.5, 0.6),
        EmotionType::Neutral => p(0.15, 5.0, 0.0, 0.1, 0.9),
    }
}

/// Time-of-day band used by the decay context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => Self::Morning,
            12..=17 => Self::Afternoon,
            18..=21 => Self::Evening,
            _ => Self::Night,
        }
    }
}

/// Context factors modulating decay rates.
#[derive(Debug, Clone)]
pub struct DecayContext {
    pub is_user_present: bool,
    pub is_user_engaged: bool,
    /// 0-1
    pub recent_emotional_activity: f64,
    /// 0-1
    pub environmental_stress: f64,
    /// 0-1
    pub social_support: f64,
    pub time_of_day: TimeOfDay,
    /// 0-1
    pub personality_stability: f64,
}

impl Default for DecayContext {
    fn default() -> Self {
        Self {
            is_user_present: false,
            is_user_engaged: false,
            recent_emotional_activity: 0.5,
            environmental_stress: 0.3,
            social_support: 0.5,
            time_of_day: TimeOfDay::Afternoon,
            personality_stability: 0.6,
        }
    }
}

/// Result of a single decay calculation.
#[derive(Debug, Clone)]
pub struct DecayResult {
    pub new_intensity: f64,
    pub decay_amount: f64,
    pub should_remove: bool,
}

/// Calculate decay for one emotion after `minutes` of elapsed wall time.
pub fn calculate_decay(
    emotion: &EmotionInstance,
    minutes: f64,
    context: &DecayContext,
) -> DecayResult {
    if emotion.emotion_type == EmotionType::Neutral {
        return DecayResult {
            new_intensity: 0.0,
            decay_amount: emotion.intensity,
            should_remove: true,
        };
    }

    let profile = decay_profile(emotion.emotion_type);
    let characteristics = emotion.emotion_type.characteristics();

    if minutes < profile.minimum_persistence {
        return DecayResult { new_intensity: emotion.intensity, decay_amount: 0.0, should_remove: false };
    }

    let adjusted_rate = adjusted_decay_rate(&profile, characteristics.valence, characteristics.social_relevance, context);

    // Exponential decay softened by resilience: high-intensity resilient
    // emotions shed proportionally less.
    let base_factor = (-adjusted_rate * minutes).exp();
    let decayed = emotion.intensity * base_factor;
    let resilience_protection = (emotion.intensity / 100.0).sqrt() * profile.resilience;
    let mut new_intensity =
        emotion.intensity - (emotion.intensity - decayed) * (1.0 - resilience_protection);

    new_intensity = contextual_modifiers(
        new_intensity,
        emotion.intensity,
        characteristics.arousal,
        characteristics.persistence,
        characteristics.valence,
        context,
    );
    new_intensity = new_intensity.clamp(0.0, 100.0);

    let removal_threshold = removal_threshold(characteristics.persistence, context);
    let should_remove = new_intensity < removal_threshold;

    DecayResult {
        new_intensity: if should_remove { 0.0 } else { new_intensity },
        decay_amount: emotion.intensity - new_intensity,
        should_remove,
    }
}

fn adjusted_decay_rate(
    profile: &DecayProfile,
    valence: Valence,
    social_relevance: SocialRelevance,
    context: &DecayContext,
) -> f64 {
    let mut rate = profile.base_decay_rate;

    if !context.is_user_present {
        match social_relevance {
            SocialRelevance::High => rate *= 1.3,
            SocialRelevance::Medium => rate *= 1.1,
            SocialRelevance::Low => {}
        }
    }
    if context.is_user_engaged {
        rate *= 0.8;
    }

    if context.recent_emotional_activity > 0.7 {
        rate *= 0.7;
    } else if context.recent_emotional_activity < 0.3 {
        rate *= 1.2;
    }

    if context.environmental_stress > 0.6 {
        rate *= if valence == Valence::Positive { 1.4 } else { 0.8 };
    }

    if context.social_support > 0.6 {
        match valence {
            Valence::Positive => rate *= 0.9,
            Valence::Negative => rate *= 1.2,
            Valence::Neutral => {}
        }
    }

    match context.time_of_day {
        TimeOfDay::Morning => rate *= 1.1,
        TimeOfDay::Evening => rate *= 0.9,
        TimeOfDay::Night => {
            if valence == Valence::Negative {
                rate *= 0.7;
            }
        }
        TimeOfDay::Afternoon => {}
    }

    rate *= 0.5 + context.personality_stability * 0.5;
    rate.max(0.001)
}

fn contextual_modifiers(
    new_intensity: f64,
    original_intensity: f64,
    arousal: Arousal,
    persistence: Persistence,
    valence: Valence,
    context: &DecayContext,
) -> f64 {
    let mut modified = new_intensity;

    // High-arousal rebound under sustained emotional activity.
    if arousal == Arousal::High && context.recent_emotional_activity > 0.8 {
        modified = new_intensity + (original_intensity - new_intensity) * 0.05;
    }

    // Sticky emotions resist decay further in supportive or stressful
    // environments, matching their valence.
    if persistence == Persistence::Sticky {
        if valence == Valence::Positive && context.social_support > 0.7 {
            modified = new_intensity + (original_intensity - new_intensity) * 0.1;
        } else if valence == Valence::Negative && context.environmental_stress > 0.6 {
            modified = new_intensity + (original_intensity - new_intensity) * 0.15;
        }
    }

    modified.clamp(0.0, 100.0)
}

fn removal_threshold(persistence: Persistence, context: &DecayContext) -> f64 {
    let base = match persistence {
        Persistence::Sticky => 0.5,
        Persistence::Normal => 1.0,
        Persistence::Fleeting => 2.0,
    };
    base * (0.5 + context.personality_stability * 0.5)
}

/// Apply decay to a set of emotions, dropping removals.
pub fn apply_decay_to_emotions(
    emotions: &[EmotionInstance],
    minutes: f64,
    context: &DecayContext,
) -> (Vec<EmotionInstance>, f64) {
    let mut updated = Vec::with_capacity(emotions.len());
    let mut total_activity = 0.0;

    for emotion in emotions {
        let result = calculate_decay(emotion, minutes, context);
        total_activity += result.decay_amount;
        if !result.should_remove && result.new_intensity > 0.0 {
            updated.push(EmotionInstance::new(emotion.emotion_type, result.new_intensity));
        }
    }
    (updated, total_activity)
}
