//! Shared plumbing for the room-level integration tests: mock providers,
//! an in-memory transport and polling helpers.

use std::sync::Arc;
use std::time::Duration;

use crosstalk_app::coordinator::{Coordinator, CoordinatorConfig, CoordinatorHandle, RoomServices};
use crosstalk_app::pipeline::BufferConfig;
use crosstalk_foundation::Language;
use crosstalk_profile::{ProfileCache, StaticProfileStore};
use crosstalk_stt::plugins::MockSttPlugin;
use crosstalk_stt::ScriptedEvent;
use crosstalk_transport::{MemoryTransport, ParticipantMetadata, RoomType};
use crosstalk_translate::MockTranslator;
use crosstalk_tts::{MockTtsEngine, VoiceCatalog};

pub struct TestRoom {
    pub transport: Arc<MemoryTransport>,
    pub tts: Arc<MockTtsEngine>,
    pub handle: CoordinatorHandle,
    pub coordinator_task: tokio::task::JoinHandle<()>,
}

/// Spin up a coordinator over mocks with a fast reconcile interval.
pub fn start_room(room_type: RoomType, stt_script: Vec<ScriptedEvent>) -> TestRoom {
    let transport = Arc::new(MemoryTransport::new());
    let tts = Arc::new(MockTtsEngine::new());
    let catalog = Arc::new(VoiceCatalog::seeded());
    let profiles = Arc::new(ProfileCache::new(
        Arc::new(StaticProfileStore::new()),
        Arc::clone(&catalog),
    ));

    let services = RoomServices {
        stt: Arc::new(MockSttPlugin::with_script(stt_script)),
        translator: Arc::new(MockTranslator::prefixing()),
        tts: tts.clone(),
        transport: transport.clone(),
        profiles,
        catalog,
    };

    let mut config = CoordinatorConfig::new("room-under-test", room_type);
    config.reconcile_interval = Duration::from_millis(50);
    config.buffer = BufferConfig::default();

    let (coordinator, handle) = Coordinator::new(config, services);
    let coordinator_task = tokio::spawn(coordinator.run());

    TestRoom {
        transport,
        tts,
        handle,
        coordinator_task,
    }
}

pub fn metadata(language: Language, avatar: &str) -> ParticipantMetadata {
    ParticipantMetadata::new(language, avatar)
}

/// Poll until `predicate` holds or the timeout expires.
pub async fn wait_until<F: FnMut() -> bool>(mut predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// A short script: one final transcript followed by the utterance end.
pub fn single_final_script(text: &str) -> Vec<ScriptedEvent> {
    use crosstalk_stt::TranscriptEvent;
    vec![
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::Final {
                segment_id: 0,
                text: text.into(),
                confidence: 0.95,
                ts_start_ms: 0,
                ts_end_ms: 400,
            },
        },
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::UtteranceEnd { segment_id: 0 },
        },
    ]
}
