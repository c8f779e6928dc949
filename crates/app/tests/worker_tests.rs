//! Worker host: job lifecycle and isolation between rooms.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{metadata, wait_until};
use crosstalk_app::pipeline::BufferConfig;
use crosstalk_app::worker::{HostServices, RoomJob, WorkerHost};
use crosstalk_foundation::Language;
use crosstalk_profile::{ProfileCache, ProfileSnapshot, StaticProfileStore};
use crosstalk_stt::plugins::MockSttPlugin;
use crosstalk_translate::MockTranslator;
use crosstalk_transport::{MemoryTransport, RoomTransport, RoomType, TrackKind};
use crosstalk_tts::{MockTtsEngine, VoiceCatalog};

const WAIT: Duration = Duration::from_secs(3);

fn host() -> WorkerHost {
    let catalog = Arc::new(VoiceCatalog::seeded());
    WorkerHost::new(HostServices {
        stt: Arc::new(MockSttPlugin::with_script(Vec::new())),
        translator: Arc::new(MockTranslator::prefixing()),
        tts: Arc::new(MockTtsEngine::new()),
        profiles: Arc::new(ProfileCache::new(
            Arc::new(StaticProfileStore::new()),
            Arc::clone(&catalog),
        )),
        catalog,
        buffer: BufferConfig::default(),
    })
}

fn job(room_id: &str, transport: Arc<MemoryTransport>) -> RoomJob {
    RoomJob {
        room_id: room_id.into(),
        room_type: RoomType::General,
        transport,
        seed_profiles: Vec::new(),
        empty_room_timeout: Duration::from_secs(300),
    }
}

#[tokio::test]
async fn a_job_binds_a_coordinator_to_its_room() {
    let host = host();
    let transport = Arc::new(MemoryTransport::new());
    host.start_job(job("room-1", transport.clone())).unwrap();

    transport.join_participant("maria", metadata(Language::Spanish, "aura-2-celeste-es"));
    transport.join_participant("john", metadata(Language::English, "aura-2-luna-en"));

    let ok = wait_until(
        || {
            transport
                .tracks()
                .iter()
                .filter(|t| t.kind == TrackKind::Translated)
                .count()
                == 2
        },
        WAIT,
    )
    .await;
    assert!(ok, "pipelines never provisioned");

    let stats = host.stats("room-1").await.unwrap();
    assert_eq!(stats.room_id, "room-1");
    assert_eq!(stats.pipelines.len(), 2);

    host.shutdown().await;
}

#[tokio::test]
async fn duplicate_room_job_is_rejected_while_running() {
    let host = host();
    let transport = Arc::new(MemoryTransport::new());
    host.start_job(job("room-1", transport.clone())).unwrap();
    assert!(host.start_job(job("room-1", transport)).is_err());
    host.shutdown().await;
}

#[tokio::test]
async fn rooms_are_isolated_from_each_other() {
    let host = host();
    let transport_a = Arc::new(MemoryTransport::new());
    let transport_b = Arc::new(MemoryTransport::new());
    host.start_job(job("room-a", transport_a.clone())).unwrap();
    host.start_job(job("room-b", transport_b.clone())).unwrap();

    transport_a.join_participant("maria", metadata(Language::Spanish, "aura-2-celeste-es"));
    transport_a.join_participant("john", metadata(Language::English, "aura-2-luna-en"));

    let ok = wait_until(
        || {
            transport_a
                .tracks()
                .iter()
                .any(|t| t.kind == TrackKind::Translated)
        },
        WAIT,
    )
    .await;
    assert!(ok);

    // Room B saw none of room A's activity.
    assert!(transport_b.tracks().is_empty());
    let stats_b = host.stats("room-b").await.unwrap();
    assert_eq!(stats_b.participant_count, 0);
    assert!(stats_b.pipelines.is_empty());

    host.shutdown().await;
}

#[tokio::test]
async fn cancelling_a_job_tears_the_room_down() {
    let host = host();
    let transport = Arc::new(MemoryTransport::new());
    host.start_job(job("room-1", transport.clone())).unwrap();

    transport.join_participant("maria", metadata(Language::Spanish, "aura-2-celeste-es"));
    transport.join_participant("john", metadata(Language::English, "aura-2-luna-en"));
    let ok = wait_until(
        || {
            transport
                .tracks()
                .iter()
                .any(|t| t.kind == TrackKind::Translated)
        },
        WAIT,
    )
    .await;
    assert!(ok);

    assert!(host.cancel_job("room-1").await);
    assert!(
        !transport
            .tracks()
            .iter()
            .any(|t| t.kind == TrackKind::Translated),
        "translated tracks survived job cancellation"
    );
    assert!(host.active_rooms().is_empty());
    assert!(host.stats("room-1").await.is_none());
}

#[tokio::test]
async fn seed_profiles_prepopulate_the_cache() {
    let catalog = Arc::new(VoiceCatalog::seeded());
    let profiles = Arc::new(ProfileCache::new(
        Arc::new(StaticProfileStore::new()),
        Arc::clone(&catalog),
    ));
    let host = WorkerHost::new(HostServices {
        stt: Arc::new(MockSttPlugin::with_script(Vec::new())),
        translator: Arc::new(MockTranslator::prefixing()),
        tts: Arc::new(MockTtsEngine::new()),
        profiles: profiles.clone(),
        catalog: Arc::clone(&catalog),
        buffer: BufferConfig::default(),
    });

    let seeded = ProfileSnapshot {
        identity: "maria".into(),
        native_language: Language::Spanish,
        voice_avatar: catalog.default_for(Language::Spanish).unwrap(),
        formal_tone: true,
        preserve_emotion: false,
        updated_at: 7,
    };
    let transport = Arc::new(MemoryTransport::new());
    host.start_job(RoomJob {
        room_id: "room-1".into(),
        room_type: RoomType::Translation,
        transport,
        seed_profiles: vec![seeded.clone()],
        empty_room_timeout: Duration::from_secs(300),
    })
    .unwrap();

    // The cache answers from the seed without a store round-trip.
    let cached = profiles.get("maria").await.unwrap();
    assert_eq!(cached, seeded);

    host.shutdown().await;
}
