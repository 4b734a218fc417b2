//! Supported image formats.
//!
//! The set is closed: target formats are validated against it when a job is
//! submitted, and stored values are re-validated whenever a job row is
//! decoded.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// An image format the conversion pipeline can read and write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpg,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
    Webp,
}

/// Every supported format, in the order they are advertised to clients.
pub const ALL_FORMATS: [ImageFormat; 7] = [
    ImageFormat::Png,
    ImageFormat::Jpg,
    ImageFormat::Jpeg,
    ImageFormat::Bmp,
    ImageFormat::Gif,
    ImageFormat::Tiff,
    ImageFormat::Webp,
];

impl ImageFormat {
    /// Parse a format name or file extension, case-insensitively.
    ///
    /// A leading dot is tolerated (`".PNG"` parses as [`ImageFormat::Png`]).
    pub fn from_extension(ext: &str) -> Result<Self, CoreError> {
        let normalized = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        match normalized.as_str() {
            "png" => Ok(Self::Png),
            "jpg" => Ok(Self::Jpg),
            "jpeg" => Ok(Self::Jpeg),
            "bmp" => Ok(Self::Bmp),
            "gif" => Ok(Self::Gif),
            "tiff" => Ok(Self::Tiff),
            "webp" => Ok(Self::Webp),
            _ => Err(CoreError::UnsupportedFormat(format!(
                "'{ext}' is not one of: {}",
                supported_list()
            ))),
        }
    }

    /// Derive the format from a filename's extension.
    pub fn from_filename(filename: &str) -> Result<Self, CoreError> {
        match filename.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Err(CoreError::UnsupportedFormat(format!(
                "filename '{filename}' has no recognizable extension"
            ))),
        }
    }

    /// Lowercase file extension (also the wire name).
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpg => "jpg",
            Self::Jpeg => "jpeg",
            Self::Bmp => "bmp",
            Self::Gif => "gif",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        }
    }

    /// MIME type used when storing blobs of this format.
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpg | Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
            Self::Gif => "image/gif",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    /// Whether the encoder for this format can carry an alpha channel.
    ///
    /// Images with alpha must be flattened to an opaque color model before
    /// they are encoded into a format that returns `false` here.
    pub fn supports_alpha(self) -> bool {
        !matches!(self, Self::Jpg | Self::Jpeg)
    }
}

fn supported_list() -> String {
    ALL_FORMATS
        .iter()
        .map(|f| f.extension())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

impl TryFrom<String> for ImageFormat {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_extension(&value)
    }
}
