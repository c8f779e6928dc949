//! Per-room participant registry.
//!
//! Owned exclusively by the coordinator's event loop; readers get cloned
//! snapshots. Metadata is parsed into a typed participant record on join or
//! update and never re-parsed afterwards.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::pipeline::PipelineKey;
use crate::router::RoomView;
use crosstalk_profile::ProfileSnapshot;
use crosstalk_transport::TrackId;

/// A present participant with their effective profile. The language and
/// voice come from transport metadata (authoritative), the preferences from
/// the cached profile.
#[derive(Debug, Clone)]
pub struct Participant {
    pub profile: ProfileSnapshot,
    pub joined_at: Instant,
    pub raw_track: Option<TrackId>,
}

impl Participant {
    pub fn identity(&self) -> &str {
        &self.profile.identity
    }
}

#[derive(Default)]
pub struct Registry {
    participants: HashMap<String, Participant>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, participant: Participant) {
        self.participants
            .insert(participant.profile.identity.clone(), participant);
    }

    pub fn remove(&mut self, identity: &str) -> Option<Participant> {
        self.participants.remove(identity)
    }

    pub fn get(&self, identity: &str) -> Option<&Participant> {
        self.participants.get(identity)
    }

    pub fn get_mut(&mut self, identity: &str) -> Option<&mut Participant> {
        self.participants.get_mut(identity)
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.participants.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Language view for the router.
    pub fn room_view(&self) -> RoomView {
        let mut view = RoomView::new();
        for participant in self.participants.values() {
            view = view.with(
                participant.identity().to_string(),
                participant.profile.native_language,
            );
        }
        view
    }

    /// The pipeline set this registry implies: one per ordered pair of
    /// present participants with distinct languages whose speaker has a
    /// published raw track to tap.
    pub fn expected_pipelines(&self) -> HashSet<PipelineKey> {
        let mut expected = HashSet::new();
        for listener in self.participants.values() {
            for speaker in self.participants.values() {
                if listener.identity() == speaker.identity() {
                    continue;
                }
                if listener.profile.native_language == speaker.profile.native_language {
                    continue;
                }
                if speaker.raw_track.is_none() {
                    continue;
                }
                expected.insert(PipelineKey {
                    listener: listener.identity().to_string(),
                    speaker: speaker.identity().to_string(),
                });
            }
        }
        expected
    }
}
