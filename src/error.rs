// One error type for the whole crate.
// Every variant states *where* things went wrong, and `http_status` tells an
// outer service whether the caller or the server is to blame.
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A stored image reference is missing or does not decode.
    #[error("input unreadable: {reference}: {reason}")]
    InputUnreadable { reference: String, reason: String },

    /// Mask and image sizes differ (recolor).
    #[error("shape mismatch: image is {image_w}x{image_h}, mask is {mask_w}x{mask_h}")]
    ShapeMismatch {
        image_w: u32,
        image_h: u32,
        mask_w: u32,
        mask_h: u32,
    },

    /// Overlay was decoded without an alpha channel.
    #[error("overlay needs 4 channels (color+alpha), got {got}")]
    ChannelCount { got: u8 },

    /// Point correspondences do not define a usable homography.
    #[error("degenerate quad: {0}")]
    DegenerateQuad(String),

    /// Request fields are out of contract (e.g. wrong number of points).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Writing into the media directory failed.
    #[error("store error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Encoding a produced image failed.
    #[error("encode error: {0}")]
    Encode(#[from] image::ImageError),

    /// Config file could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    /// Preview window could not be created or updated.
    #[error("preview error: {0}")]
    Preview(String),
}

impl Error {
    /// Status an HTTP layer would answer with: caller mistakes are 400,
    /// everything on our side is 500.
    pub fn http_status(&self) -> u16 {
        match self {
            Error::InputUnreadable { .. }
            | Error::ShapeMismatch { .. }
            | Error::ChannelCount { .. }
            | Error::DegenerateQuad(_)
            | Error::InvalidRequest(_) => 400,
            Error::Store { .. } | Error::Encode(_) | Error::Config(_) | Error::Preview(_) => 500,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.http_status() == 400
    }
}

pub type Result<T> = std::result::Result<T, Error>;
