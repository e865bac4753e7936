//! Optional transformations applied to an image after it lands in the cache.
//!
//! A post-processor never fails a fetch: the cache logs its error and keeps
//! the file exactly as downloaded.

use crate::error::AppError;
use std::path::{Path, PathBuf};

/// Rewrites a freshly cached image in place. Runs on the blocking pool.
pub trait ImagePostProcessor: Send + Sync {
    fn name(&self) -> &str;
    fn process(&self, path: &Path) -> Result<(), AppError>;
}

/// Removes a fixed strip of pixels from the bottom of an image.
///
/// Scraped illustrations often carry a watermark or caption bar along the
/// bottom edge. Images no taller than the strip are left alone.
#[derive(Debug, Clone)]
pub struct BottomCrop {
    margin_px: u32,
}

impl BottomCrop {
    pub fn new(margin_px: u32) -> Self {
        Self { margin_px }
    }
}

impl ImagePostProcessor for BottomCrop {
    fn name(&self) -> &str {
        "bottom-crop"
    }

    fn process(&self, path: &Path) -> Result<(), AppError> {
        let reader = image::ImageReader::open(path)
            .map_err(|e| AppError::cache_io(path, e))?
            .with_guessed_format()
            .map_err(|e| AppError::cache_io(path, e))?;
        let format = reader.format().ok_or_else(|| AppError::InternalError {
            message: format!("unrecognised image format at {}", path.display()),
            source: None,
        })?;
        let img = reader.decode().map_err(image_error)?;

        if img.height() <= self.margin_px {
            log::debug!(
                "{} skipped for {}: image is only {}px tall",
                self.name(),
                path.display(),
                img.height()
            );
            return Ok(());
        }

        let cropped = img.crop_imm(0, 0, img.width(), img.height() - self.margin_px);

        // Write beside the original and swap, so readers never see a half-written image.
        let staged = staged_path(path);
        if let Err(e) = cropped.save_with_format(&staged, format) {
            let _ = std::fs::remove_file(&staged);
            return Err(image_error(e));
        }
        std::fs::rename(&staged, path).map_err(|e| {
            let _ = std::fs::remove_file(&staged);
            AppError::cache_io(path, e)
        })
    }
}

fn staged_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.crop.part", uuid::Uuid::new_v4().simple()));
    PathBuf::from(name)
}

fn image_error(err: image::ImageError) -> AppError {
    AppError::InternalError {
        message: format!("image processing failed: {}", err),
        source: Some(Box::new(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crops_bottom_strip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pic.img");
        image::RgbImage::new(8, 10)
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        BottomCrop::new(3).process(&path).unwrap();

        let img = image::ImageReader::open(&path)
            .unwrap()
            .with_guessed_format()
            .unwrap()
            .decode()
            .unwrap();
        assert_eq!((img.width(), img.height()), (8, 7));
    }

    #[test]
    fn garbage_is_an_error_and_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.img");
        std::fs::write(&path, b"definitely not an image").unwrap();

        assert!(BottomCrop::new(3).process(&path).is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"definitely not an image");
    }
}
