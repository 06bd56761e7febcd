//! # Routing Intake
//!
//! Optional front door for collaborators that originate tasks. A [`Classifier`]
//! assigns each payload a category and [`RoutingIntake`] maps that category onto a
//! tier before submitting to the engine. The engine never classifies payloads
//! itself; routing lives entirely on this side of `enqueue`.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::constants::Tier;
use crate::engine::Engine;
use crate::error::Result;
use crate::models::{Payload, TaskId};

/// Collaborator-supplied payload classification
pub trait Classifier: Send + Sync {
    fn classify(&self, payload: &Payload) -> String;
}

impl<F> Classifier for F
where
    F: Fn(&Payload) -> String + Send + Sync,
{
    fn classify(&self, payload: &Payload) -> String {
        self(payload)
    }
}

/// Routes classified payloads to tiers
pub struct RoutingIntake {
    engine: Arc<Engine>,
    classifier: Arc<dyn Classifier>,
    routes: HashMap<String, Tier>,
    default_tier: Tier,
}

impl RoutingIntake {
    /// Unrouted categories go to `main`
    pub fn new(engine: Arc<Engine>, classifier: Arc<dyn Classifier>) -> Self {
        Self {
            engine,
            classifier,
            routes: HashMap::new(),
            default_tier: Tier::Main,
        }
    }

    pub fn route(mut self, category: impl Into<String>, tier: Tier) -> Self {
        self.routes.insert(category.into(), tier);
        self
    }

    pub fn default_tier(mut self, tier: Tier) -> Self {
        self.default_tier = tier;
        self
    }

    /// Tier a payload would be routed to
    pub fn tier_for(&self, payload: &Payload) -> Tier {
        let category = self.classifier.classify(payload);
        self.routes
            .get(&category)
            .copied()
            .unwrap_or(self.default_tier)
    }

    /// Classify and enqueue. Errors are the engine's `enqueue` errors.
    pub fn submit(&self, payload: Payload) -> Result<TaskId> {
        let tier = self.tier_for(&payload);
        let task_id = self.engine.enqueue(tier, payload)?;
        debug!(task_id = %task_id, tier = %tier, "Routed payload");
        Ok(task_id)
    }
}

impl std::fmt::Debug for RoutingIntake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingIntake")
            .field("routes", &self.routes)
            .field("default_tier", &self.default_tier)
            .finish_non_exhaustive()
    }
}
