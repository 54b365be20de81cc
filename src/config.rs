//! Extraction run configuration.

use std::path::PathBuf;

pub const DEFAULT_SMALL_COMPONENT_SIZE: u32 = 1000;

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub input_path: PathBuf,
    /// Artifacts are written as `<output_prefix><suffix>`.
    pub output_prefix: PathBuf,
    /// 0 means use every available core.
    pub requested_threads: usize,
    /// Components smaller than this are flagged tiny.
    pub small_component_size: u32,
    /// Pass source metadata (replication timestamp) through.
    pub use_metadata: bool,
    /// Resolve node locations onto ways for location-dependent profiles.
    pub use_locations_cache: bool,
    /// Accept time-conditional turn restrictions.
    pub parse_conditionals: bool,
}

impl ExtractorConfig {
    pub fn new(input_path: PathBuf, output_prefix: PathBuf) -> Self {
        Self {
            input_path,
            output_prefix,
            requested_threads: 0,
            small_component_size: DEFAULT_SMALL_COMPONENT_SIZE,
            use_metadata: true,
            use_locations_cache: true,
            parse_conditionals: false,
        }
    }

    pub fn path(&self, suffix: &str) -> PathBuf {
        let mut name = self.output_prefix.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn thread_count(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match self.requested_threads {
            0 => available,
            requested => requested.min(available),
        }
    }
}

/// Class names travel through artifacts and query parameters; anything
/// outside `[A-Za-z0-9]` would need escaping everywhere downstream.
pub fn is_valid_class_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric())
}
