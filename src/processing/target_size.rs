//! Target-file-size compression search.
//!
//! Binary-searches the encoder quality for a prepared bitmap until the
//! encoded size lands within tolerance of the requested size, or reports
//! the closest achievable result. Pure in-memory: the engine persists the
//! returned buffer.

use image::DynamicImage;
use tracing::debug;

use crate::core::ConversionSettings;
use crate::processing::codec;
use crate::utils::ConverterResult;

/// Quality floor below which output is considered unacceptable.
pub const MIN_QUALITY: u8 = 15;
/// Practical ceiling: 95-100 trades large size increases for negligible
/// visual gain.
pub const MAX_QUALITY: u8 = 95;
/// Hard cap on search iterations.
pub const MAX_ITERATIONS: usize = 20;
/// Absolute tolerance floor (5 KB), which loosens the relative tolerance
/// for very small targets.
const TOLERANCE_FLOOR_BYTES: f64 = 5120.0;

/// How the search ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Encoded size landed within tolerance of the target.
    Achieved { quality: u8, size: u64 },
    /// Search converged without entering tolerance; the closest-seen result
    /// was kept.
    ClosestMatch { quality: u8, size: u64 },
    /// Even the floor quality exceeds the target: unreachable at any
    /// quality. The floor-quality output is kept and `suggested_scale` in
    /// (0, 1] approximates the resize needed to reach the target.
    NotAchievable { size: u64, suggested_scale: f64 },
}

/// Allowed relative deviation from `target_bytes`: 2%, or the 5 KB absolute
/// floor, whichever is larger.
pub fn tolerance_for(target_bytes: u64) -> f64 {
    (TOLERANCE_FLOOR_BYTES / target_bytes as f64).max(0.02)
}

/// Searches for an encode quality whose output size approximates
/// `target_kb`, returning the winning buffer and the outcome.
///
/// Never fails for a structurally valid bitmap; codec errors propagate.
pub fn compress_to_target(
    img: &DynamicImage,
    settings: &ConversionSettings,
    target_kb: f64,
) -> ConverterResult<(Vec<u8>, SearchOutcome)> {
    let target_bytes = (target_kb * 1024.0) as u64;
    let tolerance = tolerance_for(target_bytes);
    let upper = target_bytes as f64 * (1.0 + tolerance);
    let lower = target_bytes as f64 * (1.0 - tolerance);

    // Probe the floor first: if even the lowest acceptable quality is too
    // large, no quality can reach the target.
    let floor_buf = codec::encode(img, settings, Some(MIN_QUALITY))?;
    let floor_size = floor_buf.len() as u64;
    if floor_size as f64 > upper {
        // Output size scales roughly with pixel area, so the linear scale
        // factor is the square root of the size ratio.
        let suggested_scale = (target_bytes as f64 / floor_size as f64).sqrt().min(1.0);
        debug!(
            "Target {target_bytes} B unreachable: floor quality yields {floor_size} B, \
             suggesting scale {suggested_scale:.2}"
        );
        return Ok((
            floor_buf,
            SearchOutcome::NotAchievable {
                size: floor_size,
                suggested_scale,
            },
        ));
    }

    let mut lo = MIN_QUALITY;
    let mut hi = MAX_QUALITY;
    let mut prev_mid: Option<u8> = None;
    // Closest-seen result by absolute distance from the target, in case no
    // iteration lands within tolerance.
    let mut best = (floor_size.abs_diff(target_bytes), MIN_QUALITY, floor_buf);

    for iteration in 0..MAX_ITERATIONS {
        let mid = (lo + hi) / 2;
        // Integer midpoint: once it stops moving the bounds cannot shrink
        // further, and without this guard the loop would spin in place.
        if prev_mid == Some(mid) {
            break;
        }
        prev_mid = Some(mid);

        let buf = codec::encode(img, settings, Some(mid))?;
        let size = buf.len() as u64;
        debug!(
            "Iteration {}: quality {mid} → {size} B (target {target_bytes} B)",
            iteration + 1
        );

        if size as f64 <= upper && size as f64 >= lower {
            return Ok((buf, SearchOutcome::Achieved { quality: mid, size }));
        }

        let distance = size.abs_diff(target_bytes);
        if distance < best.0 {
            best = (distance, mid, buf);
        }

        if size > target_bytes {
            hi = mid;
        } else {
            lo = mid;
        }
        if hi - lo <= 1 {
            break;
        }
    }

    let (_, quality, buf) = best;
    let size = buf.len() as u64;
    debug!("Search converged without hitting tolerance; closest is quality {quality} at {size} B");
    Ok((buf, SearchOutcome::ClosestMatch { quality, size }))
}
