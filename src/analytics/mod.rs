//! Content measurement for decoded and hydrated stories.

use crate::model::{ImageLocation, Story};
use std::fmt;

/// Quick statistics for log lines and the CLI summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorySummary {
    pub scenes: usize,
    pub scenes_with_text: usize,
    pub remote_images: usize,
    pub local_images: usize,
    pub scenes_without_image: usize,
}

impl fmt::Display for StorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scene(s), {} local image(s), {} remote image(s), {} without image",
            self.scenes, self.local_images, self.remote_images, self.scenes_without_image
        )
    }
}

/// Counts scenes by the state of their image.
pub fn measure_story(story: &Story) -> StorySummary {
    story
        .scenes
        .iter()
        .fold(StorySummary::default(), |mut summary, scene| {
            summary.scenes += 1;
            if !scene.text.trim().is_empty() {
                summary.scenes_with_text += 1;
            }
            match scene.image_location() {
                ImageLocation::Absent => summary.scenes_without_image += 1,
                ImageLocation::Remote(_) => summary.remote_images += 1,
                ImageLocation::Local(_) => summary.local_images += 1,
            }
            summary
        })
}
