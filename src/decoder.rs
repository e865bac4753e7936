// src/decoder.rs
//! Turns a raw scrape payload into a [`Story`].
//!
//! The scraper re-emits the same scene when it re-scans a page, so decoding
//! also drops duplicates and empty layers. A payload that is not the expected
//! shape at all is a [`AppError::Decode`]; a payload that merely lacks
//! scenes is a valid, empty story.

use crate::cache::cache_key;
use crate::constants::SCENE_KEY_SEPARATOR;
use crate::error::AppError;
use crate::model::{Scene, Story};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    scenes: Option<Vec<RawScene>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawScene {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
    // Scrapers report unknown sizes as -1, so the raw field is signed.
    #[serde(default)]
    image_width: Option<i64>,
    #[serde(default)]
    image_height: Option<i64>,
}

/// A usable image dimension, or `None` for negative and out-of-range values.
fn dimension(raw: Option<i64>) -> Option<u32> {
    raw.and_then(|value| u32::try_from(value).ok())
}

impl From<RawScene> for Scene {
    fn from(raw: RawScene) -> Self {
        Scene {
            text: raw.text.unwrap_or_default(),
            image_ref: raw
                .image_url
                .map(|url| url.trim().to_string())
                .filter(|url| !url.is_empty()),
            image_width: dimension(raw.image_width),
            image_height: dimension(raw.image_height),
        }
    }
}

/// Validates and normalizes scrape payloads.
#[derive(Debug, Clone, Default)]
pub struct StoryDecoder;

impl StoryDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decodes a JSON payload string.
    pub fn decode(&self, raw: &str) -> Result<Story, AppError> {
        let payload: RawPayload = serde_json::from_str(raw)?;
        Ok(self.normalize(payload))
    }

    /// Decodes a payload that has already been parsed into JSON.
    pub fn decode_value(&self, raw: serde_json::Value) -> Result<Story, AppError> {
        let payload: RawPayload = serde_json::from_value(raw)?;
        Ok(self.normalize(payload))
    }

    fn normalize(&self, payload: RawPayload) -> Story {
        let raw_scenes = payload.scenes.unwrap_or_default();
        let received = raw_scenes.len();
        let scenes = dedupe_scenes(raw_scenes.into_iter().map(Scene::from));

        if scenes.len() != received {
            log::debug!(
                "Dropped {} duplicate or empty scene(s) out of {}",
                received - scenes.len(),
                received
            );
        }

        Story {
            title: payload.title.unwrap_or_default(),
            author: payload.author.unwrap_or_default(),
            scenes,
        }
    }
}

/// Identity of a scene for deduplication: trimmed text plus a hash of the image reference.
pub fn scene_key(scene: &Scene) -> String {
    format!(
        "{}{}{}",
        scene.text.trim(),
        SCENE_KEY_SEPARATOR,
        cache_key(scene.image_ref.as_deref().unwrap_or("null"))
    )
}

/// Keeps the first occurrence of each scene, in order, and drops empty layers.
pub fn dedupe_scenes(scenes: impl IntoIterator<Item = Scene>) -> Vec<Scene> {
    let mut seen = HashSet::new();
    scenes
        .into_iter()
        .filter(|scene| !scene.is_empty())
        .filter(|scene| seen.insert(scene_key(scene)))
        .collect()
}
