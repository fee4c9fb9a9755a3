use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::SeedRect;

/// Tunables of the segmenter.
///
/// The seed fractions are a heuristic kept for compatibility with existing
/// masks; nothing downstream depends on their exact values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentParams {
    /// Left edge of the seed rectangle as a fraction of image width.
    pub left_frac: f64,
    /// Top edge of the seed rectangle as a fraction of image height.
    pub top_frac: f64,
    /// Seed width as a fraction of image width.
    pub width_frac: f64,
    /// Seed height as a fraction of image height.
    pub height_frac: f64,
    /// Explicit pixel rectangle; overrides the fractions when set.
    pub rect: Option<SeedRect>,
    /// Graph-cut refinement rounds.
    pub iterations: usize,
    /// Gaussians per color model (foreground and background each).
    pub components: usize,
    /// Smoothness weight between neighbouring pixels.
    pub gamma: f64,
}

impl Default for SegmentParams {
    fn default() -> Self {
        Self {
            left_frac: 0.05,
            top_frac: 0.10,
            width_frac: 0.90,
            height_frac: 0.80,
            rect: None,
            iterations: 5,
            components: 5,
            gamma: 50.0,
        }
    }
}

impl SegmentParams {
    /// Seed rectangle for a `w x h` image (unclipped). Fractions truncate
    /// toward zero.
    pub fn seed_rect(&self, w: u32, h: u32) -> SeedRect {
        if let Some(rect) = self.rect {
            return rect;
        }
        let (w, h) = (w as f64, h as f64);
        SeedRect {
            x: (self.left_frac * w) as i64,
            y: (self.top_frac * h) as i64,
            width: (self.width_frac * w) as i64,
            height: (self.height_frac * h) as i64,
        }
    }
}

/// Top-level settings for the studio: where media lives, how loud the logs
/// are, and the segmenter defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    /// Root directory for persisted images.
    pub media_root: PathBuf,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
    /// Worker threads for batch runs; `None` lets rayon decide.
    pub batch_threads: Option<usize>,
    pub segment: SegmentParams,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            media_root: PathBuf::from("media"),
            log_filter: "info".to_string(),
            batch_threads: None,
            segment: SegmentParams::default(),
        }
    }
}

impl StudioConfig {
    /// Read a JSON config file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json(&text).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seed_is_the_inset_rectangle() {
        let p = SegmentParams::default();
        assert_eq!(
            p.seed_rect(100, 50),
            SeedRect { x: 5, y: 5, width: 90, height: 40 }
        );
        // 0.05 * 1 truncates to 0, so tiny images get an empty seed
        let tiny = p.seed_rect(1, 1);
        assert_eq!((tiny.width, tiny.height), (0, 0));
    }

    #[test]
    fn explicit_rect_wins() {
        let rect = SeedRect { x: 1, y: 2, width: 3, height: 4 };
        let p = SegmentParams { rect: Some(rect), ..Default::default() };
        assert_eq!(p.seed_rect(640, 480), rect);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = StudioConfig::from_json(r#"{ "media_root": "/tmp/m", "segment": { "iterations": 2 } }"#)
            .unwrap();
        assert_eq!(cfg.media_root, PathBuf::from("/tmp/m"));
        assert_eq!(cfg.segment.iterations, 2);
        assert_eq!(cfg.segment.components, 5);
        assert_eq!(cfg.log_filter, "info");
    }

    #[test]
    fn bad_json_is_config_error() {
        let err = StudioConfig::from_json("{ nope").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
