// Request handling: resolve inputs from the store, run one transform, persist
// the result, answer with references. Requests and responses are plain serde
// structs so the CLI (or any outer service) can pass them around as JSON.

use image::DynamicImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::SegmentParams;
use crate::draw::{GUIDE_COLOR, draw_quad_guide};
use crate::error::{Error, Result};
use crate::overlay::overlay_wheel;
use crate::recolor::recolor;
use crate::segment::segment;
use crate::store::{ImageSink, ImageSource};
use crate::types::{Point, Quad, SeedRect, binarize_mask};

/// Store categories produced images are filed under.
pub const MASKS: &str = "masks";
pub const VARIANTS: &str = "variants";
pub const GUIDES: &str = "guides";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequest {
    pub image_path: String,
    /// Explicit seed rectangle; the configured heuristic is used when absent.
    #[serde(default)]
    pub rect: Option<SeedRect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentResponse {
    pub mask_path: String,
    /// Why the segmenter fell back to an all-included mask, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecolorRequest {
    pub image_path: String,
    pub mask_path: String,
    /// Hue shift in degrees/2 (OpenCV hue range 0..180).
    #[serde(default)]
    pub dh: f32,
    /// Relative saturation change (0.2 = +20%).
    #[serde(default)]
    pub ds: f32,
    /// Relative value change.
    #[serde(default)]
    pub dv: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayWheelRequest {
    pub base_image_path: String,
    pub wheel_image_path: String,
    /// Destination corners: top-left, top-right, bottom-right, bottom-left.
    pub dst_pts: Vec<Point>,
    /// Also store the base with the picked points drawn on it.
    #[serde(default)]
    pub guide: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guide_path: Option<String>,
}

/// One request of a batch file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Segment(SegmentRequest),
    Recolor(RecolorRequest),
    OverlayWheel(OverlayWheelRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Segment(SegmentResponse),
    Image(ImageResponse),
}

impl Response {
    /// Reference of the main produced image.
    pub fn output_path(&self) -> &str {
        match self {
            Response::Segment(r) => &r.mask_path,
            Response::Image(r) => &r.image_path,
        }
    }
}

/// Per-request result of a batch; failures do not stop the other requests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub index: usize,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs requests against one store with one set of segmenter defaults.
pub struct Studio<S> {
    store: S,
    params: SegmentParams,
}

impl<S: ImageSource + ImageSink> Studio<S> {
    pub fn new(store: S, params: SegmentParams) -> Self {
        Self { store, params }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Foreground mask of a photo, stored single channel under `masks`.
    pub fn segment(&self, req: &SegmentRequest) -> Result<SegmentResponse> {
        let image = self.store.resolve_color(&req.image_path)?;
        let mut params = self.params.clone();
        if req.rect.is_some() {
            params.rect = req.rect;
        }

        let result = segment(&image, &params);
        let degraded = result.reason().map(|r| r.to_string());
        let mask_path = self
            .store
            .persist(&DynamicImage::ImageLuma8(result.into_mask()), MASKS, true)?;
        Ok(SegmentResponse { mask_path, degraded })
    }

    /// HSV shift inside a stored mask, stored under `variants`.
    pub fn recolor(&self, req: &RecolorRequest) -> Result<ImageResponse> {
        if !(req.dh.is_finite() && req.ds.is_finite() && req.dv.is_finite()) {
            return Err(Error::InvalidRequest("recolor deltas must be finite".into()));
        }
        let image = self.store.resolve_color(&req.image_path)?;
        // Stored masks may be anti-aliased; anything above 0 is inside.
        let mask = binarize_mask(&self.store.resolve_gray(&req.mask_path)?);

        let out = recolor(&image, &mask, req.dh, req.ds, req.dv)?;
        let image_path = self.store.persist(&DynamicImage::ImageRgb8(out), VARIANTS, false)?;
        Ok(ImageResponse { image_path, guide_path: None })
    }

    /// Perspective-place a wheel onto the base, stored under `variants`
    /// (and the guide under `guides` when asked for).
    pub fn overlay_wheel(&self, req: &OverlayWheelRequest) -> Result<ImageResponse> {
        let quad: Quad = req.dst_pts.as_slice().try_into().map_err(|_| {
            Error::InvalidRequest(format!("dst_pts needs exactly 4 points, got {}", req.dst_pts.len()))
        })?;
        if quad.iter().any(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(Error::InvalidRequest("dst_pts must be finite".into()));
        }

        let base = self.store.resolve_color(&req.base_image_path)?;
        let wheel = self.store.resolve_color_alpha(&req.wheel_image_path)?;

        let out = overlay_wheel(&base, &wheel, &quad)?;
        let image_path = self.store.persist(&DynamicImage::ImageRgb8(out), VARIANTS, false)?;

        let guide_path = if req.guide {
            let mut annotated = base;
            draw_quad_guide(&mut annotated, &quad, GUIDE_COLOR);
            Some(self.store.persist(&DynamicImage::ImageRgb8(annotated), GUIDES, false)?)
        } else {
            None
        };
        Ok(ImageResponse { image_path, guide_path })
    }

    pub fn run(&self, op: &Operation) -> Result<Response> {
        match op {
            Operation::Segment(r) => self.segment(r).map(Response::Segment),
            Operation::Recolor(r) => self.recolor(r).map(Response::Image),
            Operation::OverlayWheel(r) => self.overlay_wheel(r).map(Response::Image),
        }
    }
}

impl<S: ImageSource + ImageSink + Sync> Studio<S> {
    /// Run independent requests in parallel. `threads` sizes a dedicated pool;
    /// `None` uses rayon's global pool. Outcomes keep the input order.
    pub fn run_batch(&self, ops: &[Operation], threads: Option<usize>) -> Result<Vec<BatchOutcome>> {
        let work = || -> Vec<BatchOutcome> {
            ops.par_iter()
                .enumerate()
                .map(|(index, op)| match self.run(op) {
                    Ok(response) => BatchOutcome { index, status: 200, response: Some(response), error: None },
                    Err(e) => {
                        warn!(index, status = e.http_status(), "batch request failed: {e}");
                        BatchOutcome { index, status: e.http_status(), response: None, error: Some(e.to_string()) }
                    }
                })
                .collect()
        };

        let outcomes = match threads {
            Some(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .thread_name(|idx| format!("studio-batch-{idx}"))
                    .build()
                    .map_err(|e| Error::Config(format!("failed to build batch pool: {e}")))?;
                debug!(threads = n, "running batch on dedicated pool");
                pool.install(work)
            }
            None => work(),
        };

        let failed = outcomes.iter().filter(|o| o.status != 200).count();
        info!(total = outcomes.len(), failed, "batch finished");
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_json_is_tagged() {
        let op: Operation = serde_json::from_str(
            r#"{"op":"recolor","image_path":"a.png","mask_path":"m.png","dh":30}"#,
        )
        .unwrap();
        assert_eq!(
            op,
            Operation::Recolor(RecolorRequest {
                image_path: "a.png".into(),
                mask_path: "m.png".into(),
                dh: 30.0,
                ds: 0.0,
                dv: 0.0,
            })
        );

        let op: Operation = serde_json::from_str(
            r#"{"op":"overlay_wheel","base_image_path":"b.png","wheel_image_path":"w.png",
                "dst_pts":[{"x":0,"y":0},{"x":9,"y":0},{"x":9,"y":9},{"x":0,"y":9}]}"#,
        )
        .unwrap();
        let Operation::OverlayWheel(req) = op else { panic!("wrong variant") };
        assert_eq!(req.dst_pts.len(), 4);
        assert!(!req.guide);
    }

    #[test]
    fn degraded_is_omitted_when_absent() {
        let r = SegmentResponse { mask_path: "media/masks/x.png".into(), degraded: None };
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"mask_path":"media/masks/x.png"}"#);
        let r = Response::Image(ImageResponse { image_path: "v.png".into(), guide_path: None });
        assert_eq!(serde_json::to_string(&r).unwrap(), r#"{"image_path":"v.png"}"#);
        assert_eq!(r.output_path(), "v.png");
    }
}
