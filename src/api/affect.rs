//! Bond/emotion dashboard snapshots and rare-event endpoints.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::errors::DomainError;
use crate::domain::models::{Notification, RareEvent};

use super::state::{ApiError, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/dashboard/state", get(dashboard_state))
        .route("/bond", get(bond_state))
        .route("/bond/interaction", post(record_interaction))
        .route("/bond/decay", post(apply_bond_decay))
        .route("/emotion/:session_id", get(emotion_state))
        .route("/emotion/:session_id/stimulus", post(process_stimulus))
        .route("/rare-events", get(list_rare_events))
        .route("/rare-events/:id/shown", post(mark_shown))
        .route("/rare-events/:id/dismiss", post(mark_dismissed))
        .route("/notifications", post(enqueue_notification).get(pending_notifications))
}

async fn bond_state(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let bond = state.bond.get_state().await?;
    let disposition: serde_json::Map<String, serde_json::Value> = state
        .bond
        .disposition_modifiers()
        .await?
        .into_iter()
        .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
        .collect();
    Ok(Json(serde_json::json!({
        "affection_level": bond.affection_level,
        "trend": bond.trend,
        "streak_days": bond.streak_days,
        "last_interaction_at": bond.last_interaction_at,
        "last_meaningful_at": bond.last_meaningful_at,
        "disposition": disposition,
    })))
}

#[derive(Deserialize)]
struct InteractionBody {
    quality: String,
    #[serde(default)]
    duration_minutes: Option<f64>,
}

async fn record_interaction(
    State(state): State<AppState>,
    Json(body): Json<InteractionBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let quality = crate::domain::models::InteractionQuality::from_str(&body.quality)
        .ok_or_else(|| {
            ApiError(DomainError::Validation(format!("Invalid quality: {}", body.quality)))
        })?;
    let update = state.bond.record_interaction(quality, body.duration_minutes).await?;
    Ok(Json(serde_json::to_value(update).map_err(DomainError::from)?))
}

async fn apply_bond_decay(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let update = state.bond.apply_decay().await?;
    Ok(Json(serde_json::json!({ "update": update })))
}

async fn emotion_state(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.emotions.for_session(session_id).await;
    let dominant = manager.current_dominant_emotion().await?;
    let mood = manager.current_mood().await?;
    let summary = manager.emotional_state_summary().await?;
    Ok(Json(serde_json::json!({
        "dominant": dominant,
        "mood": mood,
        "summary": summary,
    })))
}

#[derive(Deserialize)]
struct StimulusBody {
    stimulus: serde_json::Value,
    #[serde(default)]
    context: serde_json::Value,
}

async fn process_stimulus(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(body): Json<StimulusBody>,
) -> ApiResult<Json<serde_json::Value>> {
    let manager = state.emotions.for_session(session_id).await;
    let emotions = manager.process_stimulus(body.stimulus, body.context).await?;
    Ok(Json(serde_json::json!({ "active_emotions": emotions })))
}

async fn dashboard_state(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let bond = state.bond.get_state().await?;

    // Dominant emotion across live sessions.
    let mut emotion_type = "neutral".to_string();
    let mut emotion_intensity = 0.0_f64;
    for session_id in state.sessions.active_sessions().await {
        let manager = state.emotions.for_session(session_id).await;
        if let Ok(Some(dominant)) = manager.current_dominant_emotion().await {
            if dominant.intensity > emotion_intensity {
                emotion_intensity = dominant.intensity;
                emotion_type = dominant.emotion_type.as_str().to_string();
            }
        }
    }

    Ok(Json(serde_json::json!({
        "bond": {
            "affection_level": bond.affection_level,
            "trend": bond.trend,
            "streak_days": bond.streak_days,
        },
        "emotion": {
            "type": emotion_type,
            "intensity": emotion_intensity / 100.0,
        },
        "sessions": {
            "active": state.sessions.active_sessions().await.len(),
        },
    })))
}

#[derive(Deserialize)]
struct RareEventsQuery {
    user_id: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn list_rare_events(
    State(state): State<AppState>,
    Query(query): Query<RareEventsQuery>,
) -> ApiResult<Json<Vec<RareEvent>>> {
    Ok(Json(
        state
            .rare_events
            .list_for_user(&query.user_id, query.limit.unwrap_or(20))
            .await?,
    ))
}

async fn mark_shown(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.rare_events.mark_shown(id).await? {
        return Err(ApiError(DomainError::Validation(format!("Rare event {id} not found"))));
    }
    Ok(Json(serde_json::json!({ "shown": true })))
}

async fn mark_dismissed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<serde_json::Value>> {
    if !state.rare_events.mark_dismissed(id).await? {
        return Err(ApiError(DomainError::Validation(format!("Rare event {id} not found"))));
    }
    Ok(Json(serde_json::json!({ "dismissed": true })))
}

#[derive(Deserialize)]
struct NotificationBody {
    user_id: String,
    medium: String,
    target: String,
    message: String,
    #[serde(default)]
    priority: Option<i64>,
}

async fn enqueue_notification(
    State(state): State<AppState>,
    Json(body): Json<NotificationBody>,
) -> ApiResult<Json<Notification>> {
    let mut notification =
        Notification::new(body.user_id, body.medium, body.target, body.message);
    if let Some(priority) = body.priority {
        notification.priority = priority;
    }
    state.rare_events.insert_notification(&notification).await?;
    Ok(Json(notification))
}

#[derive(Deserialize)]
struct PendingQuery {
    #[serde(default)]
    limit: Option<usize>,
}

async fn pending_notifications(
    State(state): State<AppState>,
    Query(query): Query<PendingQuery>,
) -> ApiResult<Json<Vec<Notification>>> {
    Ok(Json(
        state.rare_events.pending_notifications(query.limit.unwrap_or(50)).await?,
    ))
}
