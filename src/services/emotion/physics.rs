//! Emotion physics.
//!
//! Applies psychological dynamics to raw appraisal intensities: momentum
//! resistance from the current intensity, competition from opposite-valence
//! emotions, diminishing returns for repeated similar stimuli, and a mood
//! bias from the dominant emotion.

use chrono::{Duration, Utc};

use crate::domain::models::{EmotionInstance, EmotionType, Persistence, StimulusRecord, Valence};

/// How much current intensity resists change.
const MOMENTUM_FACTOR: f64 = 0.8;
/// How much opposite-valence emotions interfere with each other.
const POSITIVE_NEGATIVE_INTERFERENCE: f64 = 0.7;
/// Per similar recent stimulus.
const REPETITION_DECAY_FACTOR: f64 = 0.3;
/// How much the current mood biases interpretation.
const MOOD_BIAS_FACTOR: f64 = 0.4;
/// Window for "recent" stimuli.
const RECENT_STIMULI_WINDOW_MINUTES: i64 = 10;

/// Inputs to a physics calculation.
pub struct PhysicsContext<'a> {
    pub current_emotions: &'a [EmotionInstance],
    pub recent_stimuli: &'a [StimulusRecord],
}

/// Result of a physics calculation.
#[derive(Debug, Clone)]
pub struct PhysicsResult {
    pub final_intensity: f64,
    pub momentum_resistance: f64,
    pub valence_damping: f64,
    pub diminishing_factor: f64,
    pub contextual_bias: f64,
}

/// Calculate the realistic intensity change for one appraised emotion.
pub fn calculate_intensity_change(
    emotion_type: EmotionType,
    raw_intensity_delta: f64,
    context: &PhysicsContext<'_>,
) -> PhysicsResult {
    let characteristics = emotion_type.characteristics();
    let current_intensity = context
        .current_emotions
        .iter()
        .find(|e| e.emotion_type == emotion_type)
        .map_or(0.0, |e| e.intensity);

    let momentum = momentum_resistance(current_intensity, characteristics.persistence);
    let damping = valence_competition(emotion_type, characteristics.valence, context.current_emotions);
    let diminishing = diminishing_returns(characteristics.valence, context.recent_stimuli);
    let bias = contextual_bias(characteristics.valence, context.current_emotions);

    let mut adjusted = raw_intensity_delta;
    adjusted *= 1.0 - momentum;
    adjusted *= 1.0 - damping;
    adjusted *= diminishing;
    adjusted += bias;

    let final_intensity = (current_intensity + adjusted).clamp(0.0, 100.0);

    tracing::debug!(
        emotion = emotion_type.as_str(),
        raw = raw_intensity_delta,
        adjusted,
        current = current_intensity,
        final_intensity,
        "Emotion physics calculated"
    );

    PhysicsResult {
        final_intensity,
        momentum_resistance: momentum,
        valence_damping: damping,
        diminishing_factor: diminishing,
        contextual_bias: bias,
    }
}

fn momentum_resistance(current_intensity: f64, persistence: Persistence) -> f64 {
    let base = (current_intensity / 100.0).powi(2) * MOMENTUM_FACTOR;
    let multiplier = match persistence {
        Persistence::Sticky => 1.3,
        Persistence::Normal => 1.0,
        Persistence::Fleeting => 0.7,
    };
    base * multiplier
}

fn valence_competition(
    emotion_type: EmotionType,
    valence: Valence,
    current_emotions: &[EmotionInstance],
) -> f64 {
    if valence == Valence::Neutral {
        return 0.0;
    }

    let opposite_strength: f64 = current_emotions
        .iter()
        .filter(|e| e.emotion_type != EmotionType::Neutral && e.emotion_type != emotion_type)
        .filter(|e| {
            let other = e.emotion_type.characteristics().valence;
            (valence == Valence::Positive && other == Valence::Negative)
                || (valence == Valence::Negative && other == Valence::Positive)
        })
        .map(|e| e.intensity)
        .sum();

    ((opposite_strength / 200.0) * POSITIVE_NEGATIVE_INTERFERENCE)
        .min(POSITIVE_NEGATIVE_INTERFERENCE)
}

fn diminishing_returns(valence: Valence, recent_stimuli: &[StimulusRecord]) -> f64 {
    let cutoff = Utc::now() - Duration::minutes(RECENT_STIMULI_WINDOW_MINUTES);
    let similar = recent_stimuli
        .iter()
        .filter(|s| s.timestamp > cutoff)
        .filter(|s| (s.valence > 0.0) == (valence == Valence::Positive))
        .count();

    (1.0 - similar as f64 * REPETITION_DECAY_FACTOR).max(0.1)
}

fn contextual_bias(valence: Valence, current_emotions: &[EmotionInstance]) -> f64 {
    let dominant = current_emotions
        .iter()
        .filter(|e| e.emotion_type != EmotionType::Neutral)
        .max_by(|a, b| a.intensity.total_cmp(&b.intensity));

    let Some(dominant) = dominant else { return 0.0 };
    if dominant.intensity < 30.0 {
        return 0.0;
    }

    let dominant_valence = dominant.emotion_type.characteristics().valence;
    match (dominant_valence, valence) {
        // A negative mood darkens interpretation.
        (Valence::Negative, Valence::Negative) => dominant.intensity * 0.01 * MOOD_BIAS_FACTOR,
        (Valence::Negative, Valence::Positive) => -dominant.intensity * 0.005 * MOOD_BIAS_FACTOR,
        // A positive mood brightens it.
        (Valence::Positive, Valence::Positive) => dominant.intensity * 0.005 * MOOD_BIAS_FACTOR,
        (Valence::Positive, Valence::Negative) => -dominant.intensity * 0.01 * MOOD_BIAS_FACTOR,
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_context<'a>(
        emotions: &'a [EmotionInstance],
        stimuli: &'a [StimulusRecord],
    ) -> PhysicsContext<'a> {
        PhysicsContext { current_emotions: emotions, recent_stimuli: stimuli }
    }

    #[test]
    fn fresh_emotion_lands_near_raw_intensity() {
        let result =
            calculate_intensity_change(EmotionType::Joy, 50.0, &empty_context(&[], &[]));
        assert!((result.final_intensity - 50.0).abs() < f64::EPSILON);
        assert!(result.momentum_resistance.abs() < f64::EPSILON);
    }

    #[test]
    fn high_current_intensity_resists_change() {
        let current = vec![EmotionInstance::new(EmotionType::Joy, 90.0)];
        let result =
            calculate_intensity_change(EmotionType::Joy, 50.0, &empty_context(&current, &[]));
        // Momentum eats most of the delta; the bias nudges slightly.
        assert!(result.final_intensity < 120.0);
        assert!(result.momentum_resistance > 0.5);
    }

    #[test]
    fn opposite_valence_dampens() {
        let current = vec![EmotionInstance::new(EmotionType::Distress, 80.0)];
        let result =
            calculate_intensity_change(EmotionType::Joy, 50.0, &empty_context(&current, &[]));
        assert!(result.valence_damping > 0.0);
        assert!(result.final_intensity < 50.0);
    }

    #[test]
    fn repeated_stimuli_diminish() {
        let stimuli: Vec<StimulusRecord> = (0..3)
            .map(|_| StimulusRecord {
                stimulus_type: "message".into(),
                valence: 5.0,
                intensity: 40.0,
                timestamp: Utc::now(),
                context: serde_json::Value::Null,
            })
            .collect();
        let result =
            calculate_intensity_change(EmotionType::Joy, 50.0, &empty_context(&[], &stimuli));
        assert!(result.diminishing_factor < 0.2);
        assert!(result.final_intensity < 10.0);
    }

    #[test]
    fn mood_bias_amplifies_matching_valence() {
        let current = vec![EmotionInstance::new(EmotionType::Anger, 60.0)];
        let result =
            calculate_intensity_change(EmotionType::Distress, 30.0, &empty_context(&current, &[]));
        assert!(result.contextual_bias > 0.0);
    }

    #[test]
    fn intensity_stays_clamped() {
        let current = vec![EmotionInstance::new(EmotionType::Joy, 99.0)];
        let result =
            calculate_intensity_change(EmotionType::Joy, 100.0, &empty_context(&current, &[]));
        assert!(result.final_intensity <= 100.0);

        let result = calculate_intensity_change(EmotionType::Joy, -150.0, &empty_context(&[], &[]));
        assert!(result.final_intensity >= 0.0);
    }
}
