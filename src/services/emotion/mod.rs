//! OCC emotion pipeline: decay, appraisal, physics, persistence.

pub mod decay;
pub mod history;
pub mod manager;
pub mod physics;

pub use decay::{calculate_decay, decay_profile, DecayContext, DecayProfile, TimeOfDay};
pub use history::StimulusBuffer;
pub use manager::EmotionManager;
pub use physics::{calculate_intensity_change, PhysicsContext, PhysicsResult};

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::ports::{AffectRepository, LlmHelper};

/// Lazily-constructed per-session emotion managers.
///
/// Managers hold only hot-path caches; dropping one loses nothing, the next
/// access rebuilds it from the store.
pub struct EmotionRegistry {
    repo: Arc<dyn AffectRepository>,
    helper: Option<Arc<dyn LlmHelper>>,
    persona_name: String,
    managers: RwLock<HashMap<Uuid, Arc<EmotionManager>>>,
}

impl EmotionRegistry {
    pub fn new(
        repo: Arc<dyn AffectRepository>,
        helper: Option<Arc<dyn LlmHelper>>,
        persona_name: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            helper,
            persona_name: persona_name.into(),
            managers: RwLock::new(HashMap::new()),
        }
    }

    pub async fn for_session(&self, session_id: Uuid) -> Arc<EmotionManager> {
        if let Some(manager) = self.managers.read().await.get(&session_id) {
            return manager.clone();
        }
        let manager = Arc::new(EmotionManager::new(
            session_id,
            self.repo.clone(),
            self.helper.clone(),
            self.persona_name.clone(),
        ));
        self.managers.write().await.insert(session_id, manager.clone());
        manager
    }

    pub async fn drop_session(&self, session_id: Uuid) {
        self.managers.write().await.remove(&session_id);
    }
}
