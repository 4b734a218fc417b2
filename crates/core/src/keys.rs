//! Blob storage key generation.
//!
//! Upload keys are 128 random bits rendered as 32 hex characters plus the
//! format extension. Output keys are derived from the upload key so that a
//! re-run of the same job always targets the same object.

use crate::formats::ImageFormat;

/// Generate a fresh, opaque key for an uploaded blob.
pub fn generate_upload_key(format: ImageFormat) -> String {
    let id: u128 = rand::random();
    format!("{id:032x}.{}", format.extension())
}

/// Derive the key of the converted blob from the upload key.
///
/// `"3f…a1.png"` converted to jpeg becomes `"3f…a1.jpeg"`.
pub fn converted_key(input_key: &str, target: ImageFormat) -> String {
    let stem = input_key
        .rsplit_once('.')
        .map(|(stem, _)| stem)
        .unwrap_or(input_key);
    format!("{stem}.{}", target.extension())
}

/// Filename offered to the user when downloading a converted image.
pub fn download_filename(original: &str, target: ImageFormat) -> String {
    match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => format!("{stem}.{}", target.extension()),
        _ => format!("{original}.{}", target.extension()),
    }
}
