//! Glue between the affect engine and its consumers.
//!
//! The session service and rare-event generator see only narrow traits;
//! this module implements them over the bond manager and emotion registry
//! so neither side holds a live reference to the other's internals.

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::services::bond::BondManager;
use crate::services::emotion::EmotionRegistry;
use crate::services::rare_events::{StateSnapshot, TriggerContext};
use crate::services::session_service::ContextSource;

pub struct AffectContext {
    bond: Arc<BondManager>,
    emotions: Arc<EmotionRegistry>,
}

impl AffectContext {
    pub fn new(bond: Arc<BondManager>, emotions: Arc<EmotionRegistry>) -> Self {
        Self { bond, emotions }
    }
}

#[async_trait]
impl ContextSource for AffectContext {
    async fn context_block(&self, _user_id: Option<&str>, session_id: Uuid) -> Option<String> {
        let mut parts = Vec::new();

        match self.bond.context_summary().await {
            Ok(summary) if !summary.is_empty() => parts.push(summary),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to build bond context"),
        }

        let manager = self.emotions.for_session(session_id).await;
        match manager.emotional_state_summary().await {
            Ok(summary) => parts.push(summary),
            Err(e) => tracing::warn!(error = %e, "Failed to build emotion context"),
        }

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }

    async fn observe_user_message(
        &self,
        user_id: Option<String>,
        session_id: Uuid,
        text: String,
    ) {
        let manager = self.emotions.for_session(session_id).await;
        let stimulus = serde_json::json!({ "type": "user_message", "text": text });
        let context = serde_json::json!({ "user_id": user_id });
        if let Err(e) = manager.process_stimulus(stimulus, context).await {
            tracing::warn!(session_id = %session_id, error = %e, "Failed to process stimulus");
        }
    }
}

/// Dashboard snapshot for the rare-event generator, built from the bond
/// state and the dominant emotion across active sessions.
pub struct AffectSnapshot {
    bond: Arc<BondManager>,
    emotions: Arc<EmotionRegistry>,
    sessions: Arc<crate::services::session_service::AgentSessionService>,
}

impl AffectSnapshot {
    pub fn new(
        bond: Arc<BondManager>,
        emotions: Arc<EmotionRegistry>,
        sessions: Arc<crate::services::session_service::AgentSessionService>,
    ) -> Self {
        Self { bond, emotions, sessions }
    }
}

#[async_trait]
impl StateSnapshot for AffectSnapshot {
    async fn trigger_context(&self) -> DomainResult<Option<TriggerContext>> {
        let bond = self.bond.get_state().await?;
        let mut ctx = TriggerContext::now();
        ctx.affection_level = bond.affection_level;
        ctx.bond_trend = bond.trend.as_str().to_string();
        ctx.streak_days = bond.streak_days;

        // The user counts as present when any session saw recent activity.
        let idle_minutes = (chrono::Utc::now() - bond.last_interaction_at).num_minutes().max(0);
        ctx.is_idle = idle_minutes > 15;
        ctx.idle_minutes = u32::try_from(idle_minutes).unwrap_or(u32::MAX);
        ctx.activity_category =
            if ctx.is_idle { "absent".to_string() } else { "productive".to_string() };

        // Dominant emotion across active sessions, strongest wins.
        for session_id in self.sessions.active_sessions().await {
            let manager = self.emotions.for_session(session_id).await;
            if let Ok(Some(dominant)) = manager.current_dominant_emotion().await {
                let normalized = dominant.intensity / 100.0;
                if normalized > ctx.emotion_intensity {
                    ctx.emotion_intensity = normalized;
                    ctx.emotion_type = dominant.emotion_type.as_str().to_string();
                }
            }
        }

        Ok(Some(ctx))
    }
}
