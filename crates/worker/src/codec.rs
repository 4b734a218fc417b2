//! Codec Adapter: decode, normalize and re-encode image bytes.
//!
//! Decoding and encoding are CPU-bound and run on the blocking pool.

use std::io::Cursor;

use bytes::Bytes;
use image::{DynamicImage, ImageReader};
use pixelforge_core::formats::ImageFormat;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode {format} image: {source}")]
    Decode {
        format: ImageFormat,
        source: image::ImageError,
    },

    #[error("failed to encode {format} image: {source}")]
    Encode {
        format: ImageFormat,
        source: image::ImageError,
    },

    #[error("codec task failed: {0}")]
    Task(String),
}

fn codec_format(format: ImageFormat) -> image::ImageFormat {
    match format {
        ImageFormat::Png => image::ImageFormat::Png,
        ImageFormat::Jpg | ImageFormat::Jpeg => image::ImageFormat::Jpeg,
        ImageFormat::Bmp => image::ImageFormat::Bmp,
        ImageFormat::Gif => image::ImageFormat::Gif,
        ImageFormat::Tiff => image::ImageFormat::Tiff,
        ImageFormat::Webp => image::ImageFormat::WebP,
    }
}

/// Convert `bytes` from `source` to `target` on a blocking thread.
pub async fn convert(
    bytes: Bytes,
    source: ImageFormat,
    target: ImageFormat,
) -> Result<Bytes, CodecError> {
    tokio::task::spawn_blocking(move || convert_blocking(&bytes, source, target))
        .await
        .map_err(|e| CodecError::Task(e.to_string()))?
}

/// Synchronous conversion.
///
/// The declared `source` format is only a hint: content sniffing wins when
/// the bytes identify their own format.
pub fn convert_blocking(
    bytes: &[u8],
    source: ImageFormat,
    target: ImageFormat,
) -> Result<Bytes, CodecError> {
    let decode_err = |source_err| CodecError::Decode {
        format: source,
        source: source_err,
    };

    let image = ImageReader::with_format(Cursor::new(bytes), codec_format(source))
        .with_guessed_format()
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(decode_err)?;

    let normalized = normalize(image, target);

    let mut out = Vec::new();
    normalized
        .write_to(&mut Cursor::new(&mut out), codec_format(target))
        .map_err(|e| CodecError::Encode {
            format: target,
            source: e,
        })?;
    Ok(Bytes::from(out))
}

/// Reduce the pixel layout to one every target encoder accepts.
///
/// Targets without an alpha channel are flattened to RGB8; the rest keep
/// alpha only when the source has it.
pub fn normalize(image: DynamicImage, target: ImageFormat) -> DynamicImage {
    if target.supports_alpha() && image.color().has_alpha() {
        DynamicImage::ImageRgba8(image.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(image.to_rgb8())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use image::{ColorType, Rgba, RgbaImage};

    use super::*;

    fn rgba_png() -> Vec<u8> {
        let img = RgbaImage::from_fn(8, 6, |x, y| Rgba([x as u8 * 30, y as u8 * 40, 90, 128]));
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn png_with_alpha_converts_to_jpeg() {
        let out = convert_blocking(&rgba_png(), ImageFormat::Png, ImageFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Jpeg);

        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn alpha_is_kept_for_png_target() {
        let out = convert_blocking(&rgba_png(), ImageFormat::Png, ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&out).unwrap();
        assert_eq!(decoded.color(), ColorType::Rgba8);
    }

    #[test]
    fn every_target_format_encodes() {
        let src = rgba_png();
        for target in pixelforge_core::formats::ALL_FORMATS {
            let out = convert_blocking(&src, ImageFormat::Png, target)
                .unwrap_or_else(|e| panic!("{target}: {e}"));
            assert_eq!(image::guess_format(&out).unwrap(), codec_format(target));
        }
    }

    #[test]
    fn mislabelled_source_is_sniffed() {
        let out = convert_blocking(&rgba_png(), ImageFormat::Bmp, ImageFormat::Gif).unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::Gif);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert_matches!(
            convert_blocking(b"definitely not an image", ImageFormat::Png, ImageFormat::Jpeg),
            Err(CodecError::Decode { format: ImageFormat::Png, .. })
        );
    }

    #[tokio::test]
    async fn async_convert_runs_on_blocking_pool() {
        let out = convert(Bytes::from(rgba_png()), ImageFormat::Png, ImageFormat::Webp)
            .await
            .unwrap();
        assert_eq!(image::guess_format(&out).unwrap(), image::ImageFormat::WebP);
    }
}
