//! Story document model: the decoded, deduplicated shape of one page scrape.

mod image_ref;

pub use image_ref::{is_local_reference, ImageLocation};

use serde::{Deserialize, Serialize};

/// A decoded story: metadata plus its scenes in page order.
///
/// `scenes` is always present; a payload without scenes decodes to an
/// empty list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    pub author: String,
    pub scenes: Vec<Scene>,
}

impl Story {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            scenes: Vec::new(),
        }
    }

    pub fn with_scenes(mut self, scenes: Vec<Scene>) -> Self {
        self.scenes = scenes;
        self
    }

    /// Distinct image references still pointing at a remote host, in first-seen order.
    pub fn remote_image_refs(&self) -> Vec<&str> {
        let mut seen = indexmap::IndexSet::new();
        for scene in &self.scenes {
            if let Some(reference) = scene.image_ref.as_deref() {
                if !is_local_reference(reference) {
                    seen.insert(reference);
                }
            }
        }
        seen.into_iter().collect()
    }

    /// Returns a human-readable display title.
    pub fn display_title(&self) -> &str {
        if self.title.trim().is_empty() {
            "Untitled Story"
        } else {
            &self.title
        }
    }
}

/// One layer of a story: some text, optionally illustrated.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scene {
    pub text: String,
    /// Remote URL after decoding, local path after hydration, `None` when the
    /// scene has no image or its image could not be fetched.
    #[serde(rename = "imageUrl", default)]
    pub image_ref: Option<String>,
    #[serde(rename = "imageWidth", default, skip_serializing_if = "Option::is_none")]
    pub image_width: Option<u32>,
    #[serde(rename = "imageHeight", default, skip_serializing_if = "Option::is_none")]
    pub image_height: Option<u32>,
}

impl Scene {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, reference: impl Into<String>) -> Self {
        self.image_ref = Some(reference.into());
        self
    }

    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.image_width = Some(width);
        self.image_height = Some(height);
        self
    }

    /// A scene with neither text nor image carries nothing worth keeping.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.image_ref.is_none()
    }

    /// Where this scene's image currently lives.
    pub fn image_location(&self) -> ImageLocation<'_> {
        ImageLocation::of(self.image_ref.as_deref())
    }
}
