//! Single-pipeline behavior over mock providers: end-to-end speech flow,
//! supersession, deadline handling, failure reporting and drain.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crosstalk_app::pipeline::{BufferConfig, Pipeline, PipelineDeps, PipelineSpec};
use crosstalk_foundation::{Language, PipelineError, ProviderError};
use crosstalk_profile::ProfileSnapshot;
use crosstalk_stt::plugins::MockSttPlugin;
use crosstalk_stt::{ScriptedEvent, TranscriptEvent};
use crosstalk_translate::MockTranslator;
use crosstalk_transport::{MemoryTransport, ParticipantMetadata, RoomTransport, TrackId};
use crosstalk_tts::{MockTtsEngine, VoiceCatalog};
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(3);

fn listener_profile(identity: &str, language: Language) -> ProfileSnapshot {
    let catalog = VoiceCatalog::seeded();
    ProfileSnapshot {
        identity: identity.into(),
        native_language: language,
        voice_avatar: catalog.default_for(language).unwrap(),
        formal_tone: false,
        preserve_emotion: true,
        updated_at: 0,
    }
}

struct Rig {
    transport: Arc<MemoryTransport>,
    tts: Arc<MockTtsEngine>,
    translator: Arc<MockTranslator>,
    speaker_track: TrackId,
}

fn rig() -> Rig {
    let transport = Arc::new(MemoryTransport::new());
    let speaker_track = transport.join_participant(
        "john",
        ParticipantMetadata::new(Language::English, "aura-2-luna-en"),
    );
    transport.join_participant(
        "maria",
        ParticipantMetadata::new(Language::Spanish, "aura-2-celeste-es"),
    );
    Rig {
        transport,
        tts: Arc::new(MockTtsEngine::new()),
        translator: Arc::new(MockTranslator::prefixing()),
        speaker_track,
    }
}

fn deps(rig: &Rig, stt: MockSttPlugin) -> PipelineDeps {
    PipelineDeps {
        stt: Arc::new(stt),
        translator: rig.translator.clone(),
        tts: rig.tts.clone(),
        transport: rig.transport.clone(),
        buffer_config: BufferConfig::default(),
    }
}

fn spec(rig: &Rig) -> PipelineSpec {
    PipelineSpec {
        listener: listener_profile("maria", Language::Spanish),
        speaker_identity: "john".into(),
        source_language: Language::English,
        speaker_track: rig.speaker_track.clone(),
    }
}

async fn wait_until<F: FnMut() -> bool>(mut predicate: F, timeout: Duration) -> bool {
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

fn final_script(text: &str) -> Vec<ScriptedEvent> {
    vec![
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::Final {
                segment_id: 0,
                text: text.into(),
                confidence: 0.95,
                ts_start_ms: 0,
                ts_end_ms: 300,
            },
        },
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::UtteranceEnd { segment_id: 0 },
        },
    ]
}

#[tokio::test]
async fn final_transcript_reaches_the_listener_track() {
    let rig = rig();
    let (failure_tx, _failure_rx) = mpsc::channel(4);
    let pipeline = Pipeline::spawn(
        spec(&rig),
        deps(&rig, MockSttPlugin::with_script(final_script("hello there friend"))),
        failure_tx,
    )
    .await
    .unwrap();

    let out_track = pipeline.out_track.id.clone();
    let transport = rig.transport.clone();
    assert!(
        wait_until(|| !transport.delivered_frames(&out_track).is_empty(), WAIT).await,
        "no translated audio reached the track"
    );

    // Translation went to the listener's language before synthesis.
    assert!(
        wait_until(
            || pipeline.metrics.segments_completed.load(Ordering::Relaxed) == 1,
            WAIT
        )
        .await
    );
    assert!(pipeline.metrics.speak_latency.average_ms().is_some());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn interim_then_final_supersession_preserves_single_utterance() {
    let rig = rig();
    let (failure_tx, _failure_rx) = mpsc::channel(4);
    // Interim at 0, materially revised at 260 (triggers provisional
    // translation), final at 520.
    let stt = MockSttPlugin::interim_then_final(0, "Hol", "Hola amigo querido ya", "Hola amigo mío");
    let pipeline = Pipeline::spawn(spec(&rig), deps(&rig, stt), failure_tx)
        .await
        .unwrap();

    let out_track = pipeline.out_track.id.clone();
    let transport = rig.transport.clone();
    assert!(
        wait_until(|| !transport.delivered_frames(&out_track).is_empty(), WAIT).await,
        "nothing was spoken"
    );

    // However the race between provisional and final resolved, exactly one
    // rendition of the utterance is spoken.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let completed = pipeline.metrics.segments_completed.load(Ordering::Relaxed);
    assert_eq!(completed, 1, "expected exactly one spoken segment");

    pipeline.shutdown().await;
}

#[tokio::test]
async fn slow_translator_drops_segment_instead_of_stalling() {
    let rig = rig();
    rig.translator.set_latency(Duration::from_millis(800));
    let (failure_tx, _failure_rx) = mpsc::channel(4);
    let pipeline = Pipeline::spawn(
        spec(&rig),
        deps(&rig, MockSttPlugin::with_script(final_script("hello"))),
        failure_tx,
    )
    .await
    .unwrap();

    let metrics = pipeline.metrics.clone();
    assert!(
        wait_until(
            || metrics.segments_dropped.load(Ordering::Relaxed) >= 1,
            WAIT
        )
        .await,
        "segment was never dropped"
    );
    assert_eq!(metrics.segments_completed.load(Ordering::Relaxed), 0);
    assert!(rig
        .transport
        .delivered_frames(&pipeline.out_track.id)
        .is_empty());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn permanent_tts_failure_is_reported_to_the_coordinator() {
    let rig = rig();
    // The listener's avatar is gone at the provider.
    rig.tts.mark_voice_unavailable("aura-2-celeste-es");
    let (failure_tx, mut failure_rx) = mpsc::channel(4);
    let pipeline = Pipeline::spawn(
        spec(&rig),
        deps(&rig, MockSttPlugin::with_script(final_script("hello"))),
        failure_tx,
    )
    .await
    .unwrap();

    let failure = tokio::time::timeout(WAIT, failure_rx.recv())
        .await
        .expect("no failure reported")
        .expect("failure channel closed");
    assert_eq!(failure.key.listener, "maria");
    assert_eq!(failure.key.speaker, "john");
    assert!(matches!(
        failure.error,
        PipelineError::Provider(ProviderError::VoiceUnavailable { .. })
    ));

    pipeline.mark_failed();
    pipeline.shutdown().await;
}

#[tokio::test]
async fn shutdown_unpublishes_the_translated_track_and_is_idempotent() {
    let rig = rig();
    let (failure_tx, _failure_rx) = mpsc::channel(4);
    let pipeline = Pipeline::spawn(
        spec(&rig),
        deps(&rig, MockSttPlugin::with_script(Vec::new())),
        failure_tx,
    )
    .await
    .unwrap();
    let out_track = pipeline.out_track.id.clone();

    assert!(rig
        .transport
        .tracks()
        .iter()
        .any(|t| t.id == out_track));

    pipeline.shutdown().await;
    assert!(
        !rig.transport.tracks().iter().any(|t| t.id == out_track),
        "translated track not unpublished"
    );
}

#[tokio::test]
async fn ordering_holds_across_consecutive_segments() {
    let rig = rig();
    let (failure_tx, _failure_rx) = mpsc::channel(4);
    let script = vec![
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::Final {
                segment_id: 0,
                text: "one one".into(),
                confidence: 0.9,
                ts_start_ms: 0,
                ts_end_ms: 200,
            },
        },
        ScriptedEvent {
            at_ms: 10,
            event: TranscriptEvent::UtteranceEnd { segment_id: 0 },
        },
        ScriptedEvent {
            at_ms: 40,
            event: TranscriptEvent::Final {
                segment_id: 1,
                text: "two two two".into(),
                confidence: 0.9,
                ts_start_ms: 220,
                ts_end_ms: 400,
            },
        },
        ScriptedEvent {
            at_ms: 40,
            event: TranscriptEvent::UtteranceEnd { segment_id: 1 },
        },
    ];
    let pipeline = Pipeline::spawn(spec(&rig), deps(&rig, MockSttPlugin::with_script(script)), failure_tx)
        .await
        .unwrap();

    let metrics = pipeline.metrics.clone();
    assert!(
        wait_until(
            || metrics.segments_completed.load(Ordering::Relaxed) == 2,
            WAIT
        )
        .await,
        "both segments should complete"
    );

    // The mock TTS emits one frame per word, so the track must hold the
    // two-word segment's frames strictly before the three-word segment's.
    let frames = rig.transport.delivered_frames(&pipeline.out_track.id);
    assert_eq!(frames.len(), 5);
    let first_value = frames[0].data[0];
    assert_eq!(frames[1].data[0], first_value);
    assert_ne!(frames[2].data[0], first_value);
    assert_eq!(frames[2].data[0], frames[3].data[0]);
    assert_eq!(frames[3].data[0], frames[4].data[0]);

    pipeline.shutdown().await;
}
