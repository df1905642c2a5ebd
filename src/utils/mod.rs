pub mod error;
pub mod formats;
pub mod fs;

pub use error::{ConverterError, ConverterResult, PathError, ValidationError};
pub use formats::{is_supported_input, OutputFormat, SUPPORTED_INPUT_EXTENSIONS};
pub use fs::{
    ensure_parent_dir,
    get_file_size,
    next_available_path,
    output_file_name,
    resolve_output_folder,
};
