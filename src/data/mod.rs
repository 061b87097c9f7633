//! Dataset loading and normalization.

pub mod loader;
pub mod normalize;

pub use loader::{discover_csv_files, DatasetLoader, LoaderOptions, UploadSet};
