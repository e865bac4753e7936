//! Extraction coordinator: single flight, exactly-once callbacks, deadlines.

mod common;

use common::{hydrator, open_cache, ScriptedTransport};
use pretty_assertions::assert_eq;
use scene2story::{
    AppError, ChannelDispatcher, ExtractionConfig, ExtractionCoordinator, ImageLocation,
    RefreshCallback, SessionPhase, Story,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const PAYLOAD: &str = r#"{
    "title": "The Lighthouse",
    "author": "M. Keeper",
    "scenes": [
        {"text": "A storm rolls in.", "imageUrl": "https://img.example/storm.png",
         "imageWidth": 800, "imageHeight": 600},
        {"text": "The lamp flickers.", "imageUrl": null}
    ]
}"#;

fn config(session_timeout: Duration) -> ExtractionConfig {
    ExtractionConfig {
        session_timeout,
        hydration_concurrency: 4,
        hydration_task_timeout: Duration::from_secs(5),
        ..ExtractionConfig::default()
    }
}

/// Fast-callback results land in a channel so tests can count them.
fn recorder() -> (
    impl FnOnce(Result<Story, AppError>) + Send + 'static,
    mpsc::UnboundedReceiver<Result<Story, AppError>>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |result| {
            let _ = tx.send(result);
        },
        rx,
    )
}

fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}

#[tokio::test]
async fn fast_then_refresh_callbacks() {
    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let cache = open_cache(dir.path(), transport.clone(), 1).await;
    let coordinator = ExtractionCoordinator::new(
        hydrator(cache, Duration::from_secs(5)),
        &config(Duration::from_secs(5)),
    );

    let (on_fast, mut fast_rx) = recorder();
    let (refresh_tx, mut refresh_rx) = mpsc::unbounded_channel();
    let on_refresh: RefreshCallback = Box::new(move |story, report| {
        let _ = refresh_tx.send((story, report));
    });

    let handle = coordinator.submit_payload(PAYLOAD, on_fast, Some(on_refresh));
    let final_story = handle.wait().await.unwrap();

    let fast = drain(&mut fast_rx);
    assert_eq!(fast.len(), 1);
    let fast_story = fast.into_iter().next().unwrap().unwrap();
    assert_eq!(
        fast_story.scenes[0].image_location(),
        ImageLocation::Remote("https://img.example/storm.png")
    );

    let (refreshed, report) = refresh_rx.recv().await.unwrap();
    assert_eq!(refreshed, final_story);
    assert_eq!(report.resolved, 1);
    assert!(matches!(
        refreshed.scenes[0].image_location(),
        ImageLocation::Local(_)
    ));
    assert_eq!(refreshed.scenes[1].image_ref, None);
    assert_eq!(refreshed.scenes[0].image_width, Some(800));
    assert_eq!(coordinator.phase(), SessionPhase::Idle);
    assert!(!coordinator.is_extracting());
}

#[tokio::test]
async fn decode_error_is_delivered_once() {
    let coordinator = ExtractionCoordinator::without_hydration(&config(Duration::from_secs(5)));
    let (on_fast, mut fast_rx) = recorder();

    let result = coordinator
        .submit_payload("{ not json", on_fast, None)
        .wait()
        .await;

    assert!(matches!(result, Err(AppError::Decode(_))));
    let fast = drain(&mut fast_rx);
    assert_eq!(fast.len(), 1);
    assert!(matches!(fast[0], Err(AppError::Decode(_))));
    assert!(!coordinator.is_extracting());
}

#[tokio::test]
async fn stalled_source_times_out_and_resets_guard() {
    let coordinator =
        ExtractionCoordinator::without_hydration(&config(Duration::from_millis(50)));
    let (on_fast, mut fast_rx) = recorder();
    let (payload_tx, payload_rx) = oneshot::channel::<String>();

    let handle = coordinator.submit(
        async move {
            payload_rx.await.map_err(|_| AppError::InternalError {
                message: "bridge closed".into(),
                source: None,
            })
        },
        on_fast,
        None,
    );

    let result = handle.wait().await;
    assert!(matches!(result, Err(AppError::ExtractionTimeout { .. })));
    assert!(!coordinator.is_extracting());
    assert_eq!(coordinator.phase(), SessionPhase::Idle);

    // The abandoned extraction completes late; its result must be discarded.
    payload_tx.send(PAYLOAD.to_string()).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let fast = drain(&mut fast_rx);
    assert_eq!(fast.len(), 1);
    assert!(matches!(fast[0], Err(AppError::ExtractionTimeout { .. })));
}

#[tokio::test]
async fn new_submit_overrides_stuck_session() {
    let coordinator = ExtractionCoordinator::without_hydration(&config(Duration::from_secs(5)));

    let (stuck_fast, mut stuck_rx) = recorder();
    let (stuck_tx, stuck_payload) = oneshot::channel::<String>();
    let stuck = coordinator.submit(
        async move {
            stuck_payload.await.map_err(|_| AppError::InternalError {
                message: "bridge closed".into(),
                source: None,
            })
        },
        stuck_fast,
        None,
    );
    assert!(coordinator.is_extracting());

    let (fresh_fast, mut fresh_rx) = recorder();
    let fresh = coordinator.submit_payload(PAYLOAD, fresh_fast, None);
    assert_eq!(fresh.superseded(), Some(stuck.id()));

    let story = fresh.wait().await.unwrap();
    assert_eq!(story.title, "The Lighthouse");

    stuck_tx.send(PAYLOAD.to_string()).unwrap();
    let stuck_result = stuck.wait().await;
    assert!(matches!(stuck_result, Err(AppError::SessionSuperseded { .. })));

    assert!(drain(&mut stuck_rx).is_empty());
    assert_eq!(drain(&mut fresh_rx).len(), 1);
}

#[tokio::test]
async fn callbacks_run_on_the_dispatcher() {
    let (dispatcher, mut jobs) = ChannelDispatcher::new();
    let coordinator = ExtractionCoordinator::without_hydration(&config(Duration::from_secs(5)))
        .with_dispatcher(Arc::new(dispatcher));
    let (on_fast, mut fast_rx) = recorder();

    coordinator
        .submit_payload(PAYLOAD, on_fast, None)
        .wait()
        .await
        .unwrap();

    // Nothing runs until the "UI thread" drains its queue.
    assert!(drain(&mut fast_rx).is_empty());
    let job = jobs.recv().await.unwrap();
    job();
    assert_eq!(drain(&mut fast_rx).len(), 1);
}

#[tokio::test]
async fn missing_scenes_decode_to_empty_story() {
    let coordinator = ExtractionCoordinator::without_hydration(&config(Duration::from_secs(5)));
    let (on_fast, _fast_rx) = recorder();

    let story = coordinator
        .submit_payload(r#"{"title": "Blank", "author": "Nobody"}"#, on_fast, None)
        .wait()
        .await
        .unwrap();

    assert_eq!(story.scenes, Vec::new());
}
