//! Repository scanning

pub mod languages;
pub mod pipeline;

pub use languages::{DEFAULT_EXTENSIONS, default_extensions, is_code_file, language_for_path};
pub use pipeline::{PipelineConfig, ScanPipeline};
