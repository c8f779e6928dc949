//! Audio topology enforcement.
//!
//! The router derives, from the participant registry and the published
//! track set, the exact subscription set every listener must hold, then
//! applies only the delta. For any (listener, speaker) pair the listener is
//! subscribed to the speaker's raw audio when languages match, to the
//! pipeline's translated track when they differ, and never to both: all
//! unsubscribes are applied before any subscribe, so the switch passes
//! through silence, not overlap.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crosstalk_foundation::{Language, TransportError};
use crosstalk_transport::{RoomTransport, TrackId, TrackKind};
use tracing::{debug, warn};

/// Languages of the currently present participants.
#[derive(Debug, Clone, Default)]
pub struct RoomView {
    pub languages: HashMap<String, Language>,
}

impl RoomView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, identity: impl Into<String>, language: Language) -> Self {
        self.languages.insert(identity.into(), language);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanAction {
    Unsubscribe { listener: String, track: TrackId },
    Subscribe { listener: String, track: TrackId },
}

/// Ordered set of subscription changes. Empty plan == topology already
/// correct.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologyPlan {
    pub actions: Vec<PlanAction>,
}

impl TopologyPlan {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// A subscription change that failed even after one retry.
#[derive(Debug, Clone)]
pub struct RouterFailure {
    pub listener: String,
    pub track: TrackId,
    pub error: TransportError,
}

pub struct AudioRouter {
    transport: Arc<dyn RoomTransport>,
}

impl AudioRouter {
    pub fn new(transport: Arc<dyn RoomTransport>) -> Self {
        Self { transport }
    }

    /// Desired subscription set for one listener under the current tracks.
    fn desired_for(&self, listener: &str, view: &RoomView) -> HashSet<TrackId> {
        let Some(&listener_language) = view.languages.get(listener) else {
            return HashSet::new();
        };
        let mut desired = HashSet::new();

        for info in self.transport.tracks() {
            match info.kind {
                TrackKind::Raw => {
                    // Own audio is never routed back.
                    if info.publisher == listener {
                        continue;
                    }
                    let Some(&speaker_language) = view.languages.get(&info.publisher) else {
                        continue;
                    };
                    if speaker_language == listener_language {
                        desired.insert(info.id.clone());
                    }
                }
                TrackKind::Translated => {
                    if info.intended_listener.as_deref() != Some(listener) {
                        continue;
                    }
                    // Only pairs that still exist: the speaker must be
                    // present with a differing language.
                    let Some(speaker) = info.translated_speaker.as_deref() else {
                        continue;
                    };
                    let Some(&speaker_language) = view.languages.get(speaker) else {
                        continue;
                    };
                    if speaker_language != listener_language {
                        desired.insert(info.id.clone());
                    }
                }
            }
        }
        desired
    }

    /// Compute the delta plan for the whole room. Unsubscribes sort before
    /// subscribes so no listener transits through a doubled topology.
    pub fn compute_plan(&self, view: &RoomView) -> TopologyPlan {
        let mut unsubscribes = Vec::new();
        let mut subscribes = Vec::new();

        for listener in view.languages.keys() {
            let desired = self.desired_for(listener, view);
            let current: HashSet<TrackId> =
                self.transport.subscriptions(listener).into_iter().collect();

            for track in current.difference(&desired) {
                unsubscribes.push(PlanAction::Unsubscribe {
                    listener: listener.clone(),
                    track: track.clone(),
                });
            }
            for track in desired.difference(&current) {
                subscribes.push(PlanAction::Subscribe {
                    listener: listener.clone(),
                    track: track.clone(),
                });
            }
        }

        // Deterministic order for tests and logs.
        let sort_key = |action: &PlanAction| match action {
            PlanAction::Unsubscribe { listener, track } | PlanAction::Subscribe { listener, track } => {
                (listener.clone(), track.0.clone())
            }
        };
        unsubscribes.sort_by_key(sort_key);
        subscribes.sort_by_key(sort_key);

        let mut actions = unsubscribes;
        actions.extend(subscribes);
        TopologyPlan { actions }
    }

    /// Apply a plan. Each failing action is retried once; persistent
    /// failures are reported for the coordinator to act on.
    pub async fn apply(&self, plan: &TopologyPlan) -> Vec<RouterFailure> {
        let mut failures = Vec::new();
        for action in &plan.actions {
            let (listener, track, result) = match action {
                PlanAction::Unsubscribe { listener, track } => (
                    listener,
                    track,
                    self.try_twice(listener, track, false).await,
                ),
                PlanAction::Subscribe { listener, track } => (
                    listener,
                    track,
                    self.try_twice(listener, track, true).await,
                ),
            };
            if let Err(error) = result {
                warn!(
                    target: "router",
                    listener = %listener,
                    track = %track,
                    "topology action failed after retry: {error}"
                );
                failures.push(RouterFailure {
                    listener: listener.clone(),
                    track: track.clone(),
                    error,
                });
            }
        }
        failures
    }

    async fn try_twice(
        &self,
        listener: &str,
        track: &TrackId,
        subscribe: bool,
    ) -> Result<(), TransportError> {
        let attempt = || async {
            if subscribe {
                self.transport.subscribe(listener, track).await
            } else {
                self.transport.unsubscribe(listener, track).await
            }
        };
        match attempt().await {
            Ok(()) => Ok(()),
            Err(first) => {
                debug!(target: "router", listener, track = %track, "retrying topology action: {first}");
                attempt().await
            }
        }
    }

    /// Compute and apply in one step.
    pub async fn set_topology(&self, view: &RoomView) -> (TopologyPlan, Vec<RouterFailure>) {
        let plan = self.compute_plan(view);
        if plan.is_empty() {
            return (plan, Vec::new());
        }
        debug!(target: "router", actions = plan.actions.len(), "applying topology plan");
        let failures = self.apply(&plan).await;
        (plan, failures)
    }
}
