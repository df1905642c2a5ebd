//! Format preparation: color-mode and shape normalization required by the
//! target codec, applied before any quality/compression step.
//!
//! Pure bitmap-in/bitmap-out; never touches the filesystem.

use color_quant::NeuQuant;
use image::imageops::{self, ColorMap, FilterType};
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage, RgbImage};
use tracing::debug;

use crate::core::{ConversionSettings, GifDithering, IcoSquareMode};
use crate::utils::OutputFormat;

/// Transforms `img` so it satisfies the encoding constraints of the target
/// format in `settings`.
pub fn prepare_for_format(img: DynamicImage, settings: &ConversionSettings) -> DynamicImage {
    match settings.output_format {
        // JPEG never carries transparency
        OutputFormat::Jpeg => flatten_alpha(img),
        OutputFormat::Gif => quantize_palette(img, settings.gif_dithering),
        OutputFormat::Ico => square_icon(img, settings.ico_size, settings.ico_square_mode),
        OutputFormat::Bmp => direct_color(img),
        // Handled natively by the codec
        OutputFormat::WebP | OutputFormat::Avif | OutputFormat::Png | OutputFormat::Tiff => img,
    }
}

/// Composites any alpha channel over an opaque white background, producing
/// an RGB bitmap.
fn flatten_alpha(img: DynamicImage) -> DynamicImage {
    if !img.color().has_alpha() {
        return img;
    }
    debug!("Flattening {:?} onto white for JPEG", img.color());

    let rgba = img.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut rgb = RgbImage::new(w, h);
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let a = src[3] as u32;
        for c in 0..3 {
            // out = a*src + (1-a)*white, rounded
            dst[c] = ((src[c] as u32 * a + 255 * (255 - a) + 127) / 255) as u8;
        }
    }
    DynamicImage::ImageRgb8(rgb)
}

/// Reduces the image to an adaptive palette of at most 256 colors, with
/// optional Floyd-Steinberg error diffusion.
fn quantize_palette(img: DynamicImage, dithering: GifDithering) -> DynamicImage {
    let mut rgba = img.to_rgba8();
    let palette = NeuQuant::new(10, 256, rgba.as_raw());
    match dithering {
        GifDithering::FloydSteinberg => imageops::dither(&mut rgba, &palette),
        GifDithering::None => {
            for pixel in rgba.pixels_mut() {
                palette.map_color(pixel);
            }
        }
    }
    DynamicImage::ImageRgba8(rgba)
}

/// Makes the image square (pad with transparency or center-crop), scales it
/// to the configured icon size, and guarantees an alpha channel.
fn square_icon(img: DynamicImage, size: u32, mode: IcoSquareMode) -> DynamicImage {
    let size = size.clamp(16, 256);
    let (w, h) = img.dimensions();

    let img = if w != h {
        match mode {
            IcoSquareMode::Pad => {
                let side = w.max(h);
                let mut canvas = RgbaImage::from_pixel(side, side, Rgba([0, 0, 0, 0]));
                let x = (side - w) / 2;
                let y = (side - h) / 2;
                imageops::overlay(&mut canvas, &img.to_rgba8(), x as i64, y as i64);
                debug!("ICO: padded {w}×{h} to {side}×{side}");
                DynamicImage::ImageRgba8(canvas)
            }
            IcoSquareMode::Crop => {
                let side = w.min(h);
                let x = (w - side) / 2;
                let y = (h - side) / 2;
                debug!("ICO: cropped {w}×{h} to center {side}×{side}");
                img.crop_imm(x, y, side, side)
            }
        }
    } else {
        img
    };

    let img = if img.width() != size {
        img.resize_exact(size, size, FilterType::Lanczos3)
    } else {
        img
    };

    // ICO output is always 32-bit
    match img {
        DynamicImage::ImageRgba8(_) => img,
        other => DynamicImage::ImageRgba8(other.to_rgba8()),
    }
}

/// Normalizes exotic color modes to a direct-color representation.
fn direct_color(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}
