//! Audio router invariants: subscription correctness, idempotence and
//! ordered switching.

use std::sync::Arc;

use crosstalk_app::router::{AudioRouter, PlanAction, RoomView};
use crosstalk_foundation::Language;
use crosstalk_transport::{
    MemoryTransport, ParticipantMetadata, RoomTransport, TrackKind,
};

fn meta(language: Language) -> ParticipantMetadata {
    ParticipantMetadata::new(language, "aura-2-luna-en")
}

#[tokio::test]
async fn translated_topology_replaces_raw_subscriptions() {
    let transport = Arc::new(MemoryTransport::new());
    let maria_raw = transport.join_participant("maria", meta(Language::Spanish));
    let john_raw = transport.join_participant("john", meta(Language::English));

    // Pipelines have published their tracks.
    let maria_translated = transport
        .publish_track(TrackKind::Translated, Some("maria"), Some("john"))
        .await
        .unwrap();
    let john_translated = transport
        .publish_track(TrackKind::Translated, Some("john"), Some("maria"))
        .await
        .unwrap();

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("maria", Language::Spanish)
        .with("john", Language::English);

    let (plan, failures) = router.set_topology(&view).await;
    assert!(failures.is_empty());
    assert!(!plan.is_empty());

    assert_eq!(
        transport.subscriptions("maria"),
        vec![maria_translated.id.clone()]
    );
    assert_eq!(
        transport.subscriptions("john"),
        vec![john_translated.id.clone()]
    );
    assert!(!transport.subscriptions("maria").contains(&john_raw));
    assert!(!transport.subscriptions("john").contains(&maria_raw));
}

#[tokio::test]
async fn applying_the_same_topology_twice_is_a_no_op() {
    let transport = Arc::new(MemoryTransport::new());
    transport.join_participant("maria", meta(Language::Spanish));
    transport.join_participant("john", meta(Language::English));
    transport
        .publish_track(TrackKind::Translated, Some("maria"), Some("john"))
        .await
        .unwrap();
    transport
        .publish_track(TrackKind::Translated, Some("john"), Some("maria"))
        .await
        .unwrap();

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("maria", Language::Spanish)
        .with("john", Language::English);

    let (first, _) = router.set_topology(&view).await;
    assert!(!first.is_empty());

    let (second, _) = router.set_topology(&view).await;
    assert!(second.is_empty(), "second application produced actions: {second:?}");
}

#[tokio::test]
async fn same_language_pair_keeps_raw_audio() {
    let transport = Arc::new(MemoryTransport::new());
    let a_raw = transport.join_participant("a", meta(Language::English));
    let b_raw = transport.join_participant("b", meta(Language::English));

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("a", Language::English)
        .with("b", Language::English);

    router.set_topology(&view).await;
    assert_eq!(transport.subscriptions("a"), vec![b_raw]);
    assert_eq!(transport.subscriptions("b"), vec![a_raw]);
}

#[tokio::test]
async fn unsubscribes_are_ordered_before_subscribes() {
    let transport = Arc::new(MemoryTransport::new());
    let maria_raw = transport.join_participant("maria", meta(Language::Spanish));
    let john_raw = transport.join_participant("john", meta(Language::English));

    // Start from the raw topology (as if both spoke the same language).
    transport.subscribe("maria", &john_raw).await.unwrap();
    transport.subscribe("john", &maria_raw).await.unwrap();

    transport
        .publish_track(TrackKind::Translated, Some("maria"), Some("john"))
        .await
        .unwrap();
    transport
        .publish_track(TrackKind::Translated, Some("john"), Some("maria"))
        .await
        .unwrap();

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("maria", Language::Spanish)
        .with("john", Language::English);

    let plan = router.compute_plan(&view);
    let first_subscribe = plan
        .actions
        .iter()
        .position(|a| matches!(a, PlanAction::Subscribe { .. }))
        .unwrap();
    let last_unsubscribe = plan
        .actions
        .iter()
        .rposition(|a| matches!(a, PlanAction::Unsubscribe { .. }))
        .unwrap();
    assert!(
        last_unsubscribe < first_subscribe,
        "raw audio must be released before translated audio is attached"
    );
}

#[tokio::test]
async fn listener_never_subscribes_to_own_tracks() {
    let transport = Arc::new(MemoryTransport::new());
    let maria_raw = transport.join_participant("maria", meta(Language::Spanish));
    transport.join_participant("john", meta(Language::English));

    // Maria's own translated feed (intended for john) must never appear in
    // her subscriptions, nor her own raw track.
    let john_translated = transport
        .publish_track(TrackKind::Translated, Some("john"), Some("maria"))
        .await
        .unwrap();
    transport
        .publish_track(TrackKind::Translated, Some("maria"), Some("john"))
        .await
        .unwrap();

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("maria", Language::Spanish)
        .with("john", Language::English);

    router.set_topology(&view).await;

    let maria_subs = transport.subscriptions("maria");
    assert!(!maria_subs.contains(&maria_raw));
    assert!(!maria_subs.contains(&john_translated.id));

    let john_subs = transport.subscriptions("john");
    assert_eq!(john_subs, vec![john_translated.id]);
}

#[tokio::test]
async fn persistent_subscription_failure_is_reported() {
    let transport = Arc::new(MemoryTransport::new());
    transport.join_participant("maria", meta(Language::Spanish));
    transport.join_participant("john", meta(Language::English));
    let translated = transport
        .publish_track(TrackKind::Translated, Some("maria"), Some("john"))
        .await
        .unwrap();

    transport.inject_subscription_failure(&translated.id);

    let router = AudioRouter::new(transport.clone() as Arc<dyn RoomTransport>);
    let view = RoomView::new()
        .with("maria", Language::Spanish)
        .with("john", Language::English);

    let (_, failures) = router.set_topology(&view).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].listener, "maria");
    assert_eq!(failures[0].track, translated.id);
}
