//! The per-file conversion pipeline: decode, resize, format preparation,
//! encode, and the target-size quality search.

pub mod codec;
mod engine;
mod prepare;
mod resize;
mod target_size;

pub use engine::{convert_file, ConversionEngine, FileConverter};
pub use prepare::prepare_for_format;
pub use resize::{apply_resize, target_dimensions};
pub use target_size::{
    compress_to_target, tolerance_for, SearchOutcome, MAX_ITERATIONS, MAX_QUALITY, MIN_QUALITY,
};
