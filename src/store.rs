// Media store: where requests read their inputs from and where produced
// images go. References are plain paths; produced files are named
// `<root>/<category>/<uuid v7>.png` so listings sort by creation time.

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{ColorImage, MaskImage, OverlayImage};

/// Extensions an upload may keep; anything else is stored as `.png`.
const KEPT_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Channel layout a caller wants back from `resolve`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// 3 channels; gray is expanded, alpha is dropped.
    Color,
    /// 4 channels; the stored image must carry alpha.
    ColorAlpha,
    /// 1 channel; color is reduced to luma.
    Gray,
}

/// Turns a stored-image reference into a decoded image.
pub trait ImageSource {
    /// Decode `reference` and normalise its channels per `mode`.
    fn resolve(&self, reference: &str, mode: ReadMode) -> Result<DynamicImage>;

    fn resolve_color(&self, reference: &str) -> Result<ColorImage> {
        Ok(self.resolve(reference, ReadMode::Color)?.to_rgb8())
    }

    fn resolve_color_alpha(&self, reference: &str) -> Result<OverlayImage> {
        Ok(self.resolve(reference, ReadMode::ColorAlpha)?.to_rgba8())
    }

    fn resolve_gray(&self, reference: &str) -> Result<MaskImage> {
        Ok(self.resolve(reference, ReadMode::Gray)?.to_luma8())
    }
}

/// Persists a produced image and hands back a reference to it.
pub trait ImageSink {
    /// Store `image` under `category`; `force_gray` reduces it to one channel.
    fn persist(&self, image: &DynamicImage, category: &str, force_gray: bool) -> Result<String>;
}

/// Size and channel count of an ingested upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

/// Result of `MediaStore::ingest`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ingested {
    pub image_path: String,
    /// `None` when the uploaded bytes are not a decodable image.
    pub meta: Option<ImageMeta>,
}

/// Filesystem-backed source and sink rooted at one media directory.
#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Save uploaded bytes as-is under `category`, keeping a known image
    /// extension from `filename`.
    pub fn ingest(&self, bytes: &[u8], filename: &str, category: &str) -> Result<Ingested> {
        let ext = upload_extension(filename);
        let path = self.fresh_path(category, ext)?;
        fs::write(&path, bytes).map_err(|source| Error::Store { path: path.clone(), source })?;

        let meta = image::load_from_memory(bytes).ok().map(|img| ImageMeta {
            width: img.width(),
            height: img.height(),
            channels: img.color().channel_count(),
        });
        info!(path = %path.display(), decoded = meta.is_some(), "ingested upload {filename}");
        Ok(Ingested { image_path: reference_of(&path), meta })
    }

    /// `<root>/<category>/<uuid>.<ext>`, creating the category directory.
    fn fresh_path(&self, category: &str, ext: &str) -> Result<PathBuf> {
        if category.is_empty() || category.contains(['/', '\\']) || category == ".." {
            return Err(Error::InvalidRequest(format!("bad store category {category:?}")));
        }
        let dir = self.root.join(category);
        fs::create_dir_all(&dir).map_err(|source| Error::Store { path: dir.clone(), source })?;
        Ok(dir.join(format!("{}.{ext}", Uuid::now_v7())))
    }
}

impl ImageSource for MediaStore {
    fn resolve(&self, reference: &str, mode: ReadMode) -> Result<DynamicImage> {
        let unreadable = |reason: String| Error::InputUnreadable { reference: reference.to_string(), reason };

        // 1) Decode by content, not by extension (uploads keep their names).
        let img = ImageReader::open(reference)
            .map_err(|e| unreadable(e.to_string()))?
            .with_guessed_format()
            .map_err(|e| unreadable(e.to_string()))?
            .decode()
            .map_err(|e| unreadable(e.to_string()))?;
        debug!(reference, ?mode, color = ?img.color(), "resolved {}x{}", img.width(), img.height());

        // 2) Channel normalisation.
        Ok(match mode {
            ReadMode::Color => DynamicImage::ImageRgb8(img.to_rgb8()),
            ReadMode::Gray => DynamicImage::ImageLuma8(img.to_luma8()),
            ReadMode::ColorAlpha => {
                if !img.color().has_alpha() {
                    return Err(Error::ChannelCount { got: img.color().channel_count() });
                }
                DynamicImage::ImageRgba8(img.to_rgba8())
            }
        })
    }
}

impl ImageSink for MediaStore {
    fn persist(&self, image: &DynamicImage, category: &str, force_gray: bool) -> Result<String> {
        let path = self.fresh_path(category, "png")?;
        if force_gray {
            DynamicImage::ImageLuma8(image.to_luma8()).save_with_format(&path, ImageFormat::Png)?;
        } else {
            image.save_with_format(&path, ImageFormat::Png)?;
        }
        info!(path = %path.display(), force_gray, "persisted {}x{}", image.width(), image.height());
        Ok(reference_of(&path))
    }
}

/// Lower-cased extension of `filename` when it is a kept image extension,
/// else `png`.
fn upload_extension(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    KEPT_EXTENSIONS.iter().copied().find(|k| *k == ext).unwrap_or("png")
}

/// References always use `/`, whatever the host separator is.
fn reference_of(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(img: &DynamicImage) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    #[test]
    fn extension_kept_only_for_images() {
        assert_eq!(upload_extension("car.JPG"), "jpg");
        assert_eq!(upload_extension("car.webp"), "webp");
        assert_eq!(upload_extension("car.tar.gz"), "png");
        assert_eq!(upload_extension("noext"), "png");
    }

    #[test]
    fn persist_then_resolve_keeps_size() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let img = DynamicImage::ImageRgb8(ColorImage::from_pixel(7, 3, Rgb([9, 8, 7])));

        let reference = store.persist(&img, "variants", false).unwrap();
        assert!(reference.ends_with(".png"));
        assert!(reference.contains("/variants/"));

        let back = store.resolve_color(&reference).unwrap();
        assert_eq!(back.dimensions(), (7, 3));
        assert_eq!(back.get_pixel(6, 2), &Rgb([9, 8, 7]));
    }

    #[test]
    fn forced_gray_is_single_channel() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let img = DynamicImage::ImageRgb8(ColorImage::from_pixel(4, 4, Rgb([255, 255, 255])));
        let reference = store.persist(&img, "masks", true).unwrap();

        let raw = image::open(&reference).unwrap();
        assert_eq!(raw.color().channel_count(), 1);
        assert_eq!(store.resolve_gray(&reference).unwrap().get_pixel(0, 0), &Luma([255]));
    }

    #[test]
    fn color_alpha_requires_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let rgb = DynamicImage::ImageRgb8(ColorImage::new(2, 2));
        let reference = store.persist(&rgb, "uploads", false).unwrap();
        assert!(matches!(
            store.resolve(&reference, ReadMode::ColorAlpha),
            Err(Error::ChannelCount { got: 3 })
        ));

        let rgba = DynamicImage::ImageRgba8(OverlayImage::from_pixel(2, 2, Rgba([1, 2, 3, 4])));
        let reference = store.persist(&rgba, "uploads", false).unwrap();
        assert_eq!(store.resolve_color_alpha(&reference).unwrap().get_pixel(1, 1), &Rgba([1, 2, 3, 4]));
    }

    #[test]
    fn missing_or_garbage_input_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let missing = dir.path().join("nope.png");
        assert!(matches!(
            store.resolve(&missing.to_string_lossy(), ReadMode::Color),
            Err(Error::InputUnreadable { .. })
        ));

        let junk = store.ingest(b"not an image", "junk.png", "uploads").unwrap();
        assert!(junk.meta.is_none());
        assert!(matches!(store.resolve(&junk.image_path, ReadMode::Color), Err(Error::InputUnreadable { .. })));
    }

    #[test]
    fn ingest_reports_meta() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let bytes = png_bytes(&DynamicImage::ImageRgba8(OverlayImage::new(5, 6)));
        let got = store.ingest(&bytes, "Wheel.PNG", "uploads").unwrap();
        assert!(got.image_path.ends_with(".png"));
        assert_eq!(got.meta, Some(ImageMeta { width: 5, height: 6, channels: 4 }));

        // same key as every other response that names a stored image
        let json = serde_json::to_value(&got).unwrap();
        assert_eq!(json["image_path"], serde_json::Value::String(got.image_path.clone()));
        assert_eq!(json["meta"]["channels"], 4);

        // wrong extension still decodes by content
        let renamed = store.ingest(&bytes, "wheel.jpg", "uploads").unwrap();
        assert!(renamed.image_path.ends_with(".jpg"));
        assert!(store.resolve_color_alpha(&renamed.image_path).is_ok());
    }

    #[test]
    fn category_cannot_escape_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path());
        let img = DynamicImage::ImageLuma8(MaskImage::new(1, 1));
        assert!(matches!(store.persist(&img, "../x", true), Err(Error::InvalidRequest(_))));
    }
}
