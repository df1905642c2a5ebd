//! Resize logic mapping resize modes to target pixel dimensions.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

use crate::core::{ConversionSettings, ResizeMode};

/// Computes the output dimensions for `mode` applied to an original image.
///
/// Pure dimension arithmetic; the per-axis truncation/rounding choices are
/// part of the observable contract:
/// - percentage scaling truncates both axes
/// - single-axis fit rounds the derived axis
/// - bounding-box fit truncates the derived axis
///
/// Degenerate parameters (zero sizes, an empty bounding box, a percentage
/// that collapses an axis to zero) are a no-op returning the original
/// dimensions.
pub fn target_dimensions(
    orig_w: u32,
    orig_h: u32,
    mode: &ResizeMode,
    allow_upscaling: bool,
) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (orig_w, orig_h);
    }

    match mode {
        ResizeMode::None => (orig_w, orig_h),

        ResizeMode::Percentage { percent } => {
            if *percent <= 0.0 || !percent.is_finite() {
                return (orig_w, orig_h);
            }
            let scale = percent / 100.0;
            let w = (orig_w as f64 * scale) as u32;
            let h = (orig_h as f64 * scale) as u32;
            if w == 0 || h == 0 {
                return (orig_w, orig_h);
            }
            (w, h)
        }

        ResizeMode::FitToWidth { width } => {
            if *width == 0 {
                return (orig_w, orig_h);
            }
            if !allow_upscaling && *width > orig_w {
                return (orig_w, orig_h);
            }
            let aspect = orig_w as f64 / orig_h as f64;
            let h = (*width as f64 / aspect).round() as u32;
            (*width, h.max(1))
        }

        ResizeMode::FitToHeight { height } => {
            if *height == 0 {
                return (orig_w, orig_h);
            }
            if !allow_upscaling && *height > orig_h {
                return (orig_w, orig_h);
            }
            let aspect = orig_w as f64 / orig_h as f64;
            let w = (*height as f64 * aspect).round() as u32;
            (w.max(1), *height)
        }

        ResizeMode::FitToDimensions {
            max_width,
            max_height,
        } => {
            let max_w = max_width.unwrap_or(0);
            let max_h = max_height.unwrap_or(0);
            if max_w == 0 && max_h == 0 {
                return (orig_w, orig_h);
            }

            let aspect = orig_w as f64 / orig_h as f64;
            let (mut w, mut h) = if max_h == 0 {
                (max_w, (max_w as f64 / aspect) as u32)
            } else if max_w == 0 {
                ((max_h as f64 * aspect) as u32, max_h)
            } else if orig_w as f64 / max_w as f64 > orig_h as f64 / max_h as f64 {
                // Width is the limiting axis
                (max_w, (max_w as f64 / aspect) as u32)
            } else {
                ((max_h as f64 * aspect) as u32, max_h)
            };

            if !allow_upscaling {
                // Clamped per axis; this can drift the aspect ratio slightly
                // and is the documented behavior.
                w = w.min(orig_w);
                h = h.min(orig_h);
            }
            (w.max(1), h.max(1))
        }
    }
}

/// Applies the resize specified in `settings` to `img`.
///
/// Returns the image unchanged when the computed dimensions equal the
/// original; otherwise resamples with Lanczos3.
pub fn apply_resize(img: DynamicImage, settings: &ConversionSettings) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (tw, th) = target_dimensions(w, h, &settings.resize, settings.allow_upscaling);
    if (tw, th) == (w, h) {
        return img;
    }
    debug!("Resize: {w}×{h} → {tw}×{th}");
    img.resize_exact(tw, th, FilterType::Lanczos3)
}
