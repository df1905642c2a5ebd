//! Encode/decode wrappers around the `image` and `webp` codec crates.
//!
//! All encoders write into an in-memory buffer; persisting the bytes is the
//! engine's job. Quality-driven formats accept an override so the
//! target-size search can re-encode at candidate qualities.

use std::io::Cursor;
use std::path::Path;

use image::codecs::avif::AvifEncoder;
use image::codecs::bmp::BmpEncoder;
use image::codecs::gif::GifEncoder;
use image::codecs::ico::IcoEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::tiff::TiffEncoder;
use image::metadata::Orientation;
use image::{DynamicImage, Frame, GenericImageView, ImageDecoder, ImageReader};
use tracing::debug;

use crate::core::ConversionSettings;
use crate::utils::{ConverterError, ConverterResult, OutputFormat};

/// Decodes `path` and bakes the EXIF orientation into the pixel data.
pub fn decode_oriented(path: &Path) -> ConverterResult<DynamicImage> {
    let reader = ImageReader::open(path)
        .map_err(|e| ConverterError::decode(format!("Cannot open '{}': {e}", path.display())))?
        .with_guessed_format()
        .map_err(|e| ConverterError::decode(format!("Cannot probe '{}': {e}", path.display())))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| ConverterError::decode(format!("Failed to decode '{}': {e}", path.display())))?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder)
        .map_err(|e| ConverterError::decode(format!("Failed to decode '{}': {e}", path.display())))?;

    if orientation != Orientation::NoTransforms {
        debug!("Applying EXIF orientation {orientation:?} to '{}'", path.display());
        img.apply_orientation(orientation);
    }
    Ok(img)
}

/// Encodes `img` into a buffer using the format and parameters in `settings`.
///
/// `quality_override` replaces the settings quality for formats that take
/// one; it is ignored for fixed-size formats.
pub fn encode(
    img: &DynamicImage,
    settings: &ConversionSettings,
    quality_override: Option<u8>,
) -> ConverterResult<Vec<u8>> {
    let quality = quality_override.unwrap_or(settings.quality);
    match settings.output_format {
        OutputFormat::Jpeg => encode_jpeg(img, quality),
        OutputFormat::Png => encode_png(img, settings.png_compression),
        OutputFormat::WebP => encode_webp(img, settings, quality),
        OutputFormat::Avif => encode_avif(img, settings, quality),
        OutputFormat::Gif => encode_gif(img),
        OutputFormat::Ico => encode_ico(img),
        OutputFormat::Bmp => encode_bmp(img),
        OutputFormat::Tiff => encode_tiff(img),
    }
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> ConverterResult<Vec<u8>> {
    // The JPEG encoder takes RGB or grayscale only; the format preparer has
    // already flattened alpha, this covers direct encode calls.
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_png(img: &DynamicImage, compress_level: u8) -> ConverterResult<Vec<u8>> {
    let compression = match compress_level {
        0..=3 => CompressionType::Fast,
        4..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };
    let mut buf = Vec::new();
    let encoder = PngEncoder::new_with_quality(
        Cursor::new(&mut buf),
        compression,
        PngFilter::Adaptive,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("PNG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_webp(
    img: &DynamicImage,
    settings: &ConversionSettings,
    quality: u8,
) -> ConverterResult<Vec<u8>> {
    // libwebp takes raw RGB/RGBA rows; alpha is kept only when present
    let rgb;
    let rgba;
    let (w, h) = (img.width(), img.height());
    let encoder = if img.color().has_alpha() {
        rgba = img.to_rgba8();
        webp::Encoder::from_rgba(rgba.as_raw(), w, h)
    } else {
        rgb = img.to_rgb8();
        webp::Encoder::from_rgb(rgb.as_raw(), w, h)
    };

    let mut config = webp::WebPConfig::new()
        .map_err(|_| ConverterError::encode("WebP encode failed: cannot create config"))?;
    config.lossless = i32::from(settings.lossless);
    config.quality = quality as f32;
    config.method = settings.webp_method.clamp(0, 6);

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| ConverterError::encode(format!("WebP encode failed: {e:?}")))?;
    Ok(memory.to_vec())
}

fn encode_avif(
    img: &DynamicImage,
    settings: &ConversionSettings,
    quality: u8,
) -> ConverterResult<Vec<u8>> {
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let quality = if settings.lossless { 100 } else { quality };
    let mut buf = Vec::new();
    let encoder = AvifEncoder::new_with_speed_quality(
        Cursor::new(&mut buf),
        settings.avif_speed.clamp(1, 10),
        quality,
    );
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

fn encode_gif(img: &DynamicImage) -> ConverterResult<Vec<u8>> {
    let mut buf = Vec::new();
    {
        let mut encoder = GifEncoder::new_with_speed(Cursor::new(&mut buf), 10);
        encoder
            .encode_frame(Frame::new(img.to_rgba8()))
            .map_err(|e| ConverterError::encode(format!("GIF encode failed: {e}")))?;
    }
    Ok(buf)
}

fn encode_ico(img: &DynamicImage) -> ConverterResult<Vec<u8>> {
    let converted;
    let img = match img {
        DynamicImage::ImageRgba8(_) => img,
        other => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
    };
    let mut buf = Vec::new();
    let encoder = IcoEncoder::new(Cursor::new(&mut buf));
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("ICO encode failed: {e}")))?;
    Ok(buf)
}

fn encode_bmp(img: &DynamicImage) -> ConverterResult<Vec<u8>> {
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);
    let encoder = BmpEncoder::new(&mut cursor);
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("BMP encode failed: {e}")))?;
    drop(cursor);
    Ok(buf)
}

fn encode_tiff(img: &DynamicImage) -> ConverterResult<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = TiffEncoder::new(Cursor::new(&mut buf));
    img.write_with_encoder(encoder)
        .map_err(|e| ConverterError::encode(format!("TIFF encode failed: {e}")))?;
    Ok(buf)
}
