//! Car image studio: foreground masks, HSV recoloring and perspective wheel
//! overlays for vehicle photos, plus a filesystem media store and JSON
//! request handling around them.
//!
//! The three transforms are pure functions over `image` buffers:
//! [`segment::segment`], [`recolor::recolor`] and [`overlay::overlay_wheel`].
//! [`ops::Studio`] wires them to an [`store::ImageSource`] / [`store::ImageSink`].

pub mod config;
pub mod draw;
pub mod error;
pub mod homography;
pub mod hsv;
pub mod ops;
pub mod overlay;
#[cfg(feature = "preview")]
pub mod preview;
pub mod recolor;
pub mod segment;
pub mod store;
pub mod types;

pub use config::{SegmentParams, StudioConfig};
pub use error::{Error, Result};
pub use ops::{
    BatchOutcome, ImageResponse, Operation, OverlayWheelRequest, RecolorRequest, Response, SegmentRequest,
    SegmentResponse, Studio,
};
pub use overlay::overlay_wheel;
pub use recolor::recolor;
pub use segment::{SegmentError, Segmentation, segment};
pub use store::{ImageMeta, ImageSink, ImageSource, Ingested, MediaStore, ReadMode};
pub use types::{ColorImage, MaskImage, OverlayImage, Point, Quad, SeedRect};
