//! Decode-then-hydrate scenarios, including partial network failure.

mod common;

use common::{hydrator, open_cache, ScriptedTransport};
use pretty_assertions::assert_eq;
use scene2story::{ImageLocation, Scene, Story, StoryDecoder};
use std::time::Duration;

#[tokio::test]
async fn duplicate_and_imageless_scenes_then_flaky_download() {
    let raw = r#"{
        "title": "Harbour",
        "author": "E. Tide",
        "scenes": [
            {"text": "Boats at rest.", "imageUrl": null},
            {"text": "Boats at rest.", "imageUrl": null},
            {"text": "The gulls arrive.", "imageUrl": "https://img.example/gulls.jpg"}
        ]
    }"#;

    let mut story = StoryDecoder::new().decode(raw).unwrap();
    assert_eq!(
        story
            .scenes
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>(),
        vec!["Boats at rest.", "The gulls arrive."]
    );

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.fail("https://img.example/gulls.jpg", 2);
    let cache = open_cache(dir.path(), transport.clone(), 2).await;

    let report = hydrator(cache.clone(), Duration::from_secs(5))
        .hydrate(&mut story, 4)
        .await;

    assert_eq!(report.requested, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(transport.attempts("https://img.example/gulls.jpg"), 3);
    assert_eq!(story.scenes[0].image_ref, None);
    let expected = cache.path_for("https://img.example/gulls.jpg");
    assert_eq!(
        story.scenes[1].image_location(),
        ImageLocation::Local(expected.to_str().unwrap())
    );
}

#[tokio::test]
async fn one_failed_image_does_not_abort_the_rest() {
    let mut story = Story::new("Mixed", "A. Uthor").with_scenes(vec![
        Scene::text("ok one").with_image("https://img.example/1.png"),
        Scene::text("broken").with_image("https://img.example/broken.png"),
        Scene::text("ok two").with_image("https://img.example/2.png"),
        Scene::text("ok one again").with_image("https://img.example/1.png"),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.fail("https://img.example/broken.png", u32::MAX);
    let cache = open_cache(dir.path(), transport.clone(), 1).await;

    let report = hydrator(cache, Duration::from_secs(5))
        .hydrate(&mut story, 2)
        .await;

    assert_eq!(report.requested, 3);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.scenes_cleared, 1);
    assert!(!report.is_complete());

    let texts: Vec<_> = story.scenes.iter().map(|s| s.text.as_str()).collect();
    assert_eq!(texts, vec!["ok one", "broken", "ok two", "ok one again"]);
    assert_eq!(story.scenes[1].image_ref, None);
    assert_eq!(story.scenes[0].image_ref, story.scenes[3].image_ref);
    assert_eq!(transport.attempts("https://img.example/1.png"), 1);
}

#[tokio::test]
async fn slow_image_is_cleared_after_task_timeout() {
    let mut story = Story::new("Slow", "S. Nail").with_scenes(vec![
        Scene::text("quick").with_image("https://img.example/quick.png"),
        Scene::text("slow").with_image("https://img.example/slow.png"),
    ]);

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.delay("https://img.example/slow.png", Duration::from_secs(30));
    let cache = open_cache(dir.path(), transport, 0).await;

    let report = hydrator(cache.clone(), Duration::from_millis(100))
        .hydrate(&mut story, 2)
        .await;

    assert_eq!(report.timed_out, 1);
    assert_eq!(report.resolved, 1);
    assert_eq!(story.scenes[1].image_ref, None);
    assert!(story.scenes[0].image_ref.is_some());
    assert!(!cache.path_for("https://img.example/slow.png").exists());
}

#[tokio::test]
async fn concurrency_limit_bounds_downloads() {
    let scenes = (0..8)
        .map(|i| {
            Scene::text(format!("scene {i}")).with_image(format!("https://img.example/{i}.png"))
        })
        .collect();
    let mut story = Story::new("Wide", "W. Ide").with_scenes(scenes);

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    transport.delay_all(Duration::from_millis(20));
    let cache = open_cache(dir.path(), transport.clone(), 0).await;

    let report = hydrator(cache, Duration::from_secs(5))
        .hydrate(&mut story, 2)
        .await;

    assert_eq!(report.resolved, 8);
    assert!(transport.max_in_flight() <= 2);
    assert_eq!(transport.total_attempts(), 8);
}

#[tokio::test]
async fn local_images_are_left_alone() {
    let mut story = Story::new("Local", "L. Ocal")
        .with_scenes(vec![Scene::text("on disk").with_image("/tmp/already-here.img")]);

    let dir = tempfile::tempdir().unwrap();
    let transport = ScriptedTransport::new();
    let cache = open_cache(dir.path(), transport.clone(), 0).await;

    let report = hydrator(cache, Duration::from_secs(5))
        .hydrate(&mut story, 2)
        .await;

    assert_eq!(report.requested, 0);
    assert_eq!(transport.total_attempts(), 0);
    assert_eq!(story.scenes[0].image_ref.as_deref(), Some("/tmp/already-here.img"));
}
