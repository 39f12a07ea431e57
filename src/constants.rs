//! Application constants loaded from `constants.ron` at compile time.
//!
//! The RON file is embedded via `include_str!` so it's always available,
//! parsed once on first access via `LazyLock`.

use serde::Deserialize;
use std::sync::LazyLock;
use std::time::Duration;

/// All tuneable application constants.
#[derive(Debug, Deserialize)]
pub struct Constants {
  // Gallery
  pub page_size: usize,
  pub grid_columns: usize,

  // Thumbnail extraction
  pub seek_secs: f64,
  pub jpeg_quality: u8,
  pub extract_concurrency: usize,
  pub extract_timeout_secs: u64,

  // Assets
  pub assets_root: String,
  pub fallback_thumbnail: String,
  pub placeholder_width: u32,
  pub placeholder_height: u32,

  // UI
  pub error_dismiss_secs: u64,
  pub empty_category_message: String,
}

impl Constants {
  pub fn seek_target(&self) -> Duration {
    Duration::from_secs_f64(self.seek_secs)
  }

  pub fn extract_timeout(&self) -> Duration {
    Duration::from_secs(self.extract_timeout_secs)
  }
}

static CONSTANTS: LazyLock<Constants> = LazyLock::new(|| {
  // Safety: the RON file is embedded at compile time; if it's malformed this is a build-time error.
  ron::from_str(include_str!("../constants.ron")).expect("constants.ron must be valid RON (embedded at compile time)")
});

/// Returns a reference to the parsed application constants.
pub fn constants() -> &'static Constants {
  &CONSTANTS
}
