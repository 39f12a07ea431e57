//! The fixed, ordered collection of videos shown by the gallery.
//!
//! The default catalog is embedded from `catalog.ron`; an alternate one can be
//! loaded from a RON or TOML file. Either way it is read-only for the session
//! and handed around as `Arc<Catalog>`.

use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Category that matches every video.
pub const ALL_CATEGORY: &str = "All";

/// A single clip in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Video {
  pub id: String,
  pub title: String,
  pub category: String,
  pub video_url: String,
  /// Unused placeholder; extracted thumbnails live in the `ThumbnailMap`.
  #[serde(default)]
  pub thumbnail: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
  pub categories: Vec<String>,
  pub videos: Vec<Video>,
}

impl Catalog {
  /// Parse the catalog embedded at compile time.
  pub fn embedded() -> Result<Self> {
    let catalog: Catalog = ron::from_str(include_str!("../catalog.ron")).context("Embedded catalog.ron is invalid")?;
    catalog.validate()?;
    Ok(catalog)
  }

  /// Load a catalog from a `.ron` or `.toml` file.
  pub fn load(path: &Path) -> Result<Self> {
    let content =
      std::fs::read_to_string(path).with_context(|| format!("Failed to read catalog {}", path.display()))?;
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let catalog: Catalog = match ext.as_str() {
      "ron" => ron::from_str(&content).with_context(|| format!("Invalid RON catalog {}", path.display()))?,
      "toml" => toml::from_str(&content).with_context(|| format!("Invalid TOML catalog {}", path.display()))?,
      other => bail!("Unsupported catalog format '.{}' (expected .ron or .toml)", other),
    };
    catalog.validate().with_context(|| format!("Catalog {} failed validation", path.display()))?;
    let preset = catalog.videos.iter().filter(|v| v.thumbnail.is_some()).count();
    if preset > 0 {
      debug!(path = %path.display(), preset, "catalog: thumbnail fields are ignored, stills are extracted");
    }
    info!(path = %path.display(), videos = catalog.len(), "catalog: loaded");
    Ok(catalog)
  }

  /// Check the invariants the gallery relies on.
  pub fn validate(&self) -> Result<()> {
    if self.is_empty() {
      bail!("catalog has no videos");
    }
    if self.categories.first().map(String::as_str) != Some(ALL_CATEGORY) {
      bail!("category list must start with '{}'", ALL_CATEGORY);
    }
    let mut seen = HashSet::new();
    for video in &self.videos {
      if video.id.is_empty() {
        return Err(anyhow!("video '{}' has an empty id", video.title));
      }
      if !seen.insert(video.id.as_str()) {
        return Err(anyhow!("duplicate video id '{}'", video.id));
      }
    }
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.videos.len()
  }

  pub fn is_empty(&self) -> bool {
    self.videos.is_empty()
  }

  pub fn first(&self) -> Option<&Video> {
    self.videos.first()
  }

  pub fn get(&self, id: &str) -> Option<&Video> {
    self.videos.iter().find(|v| v.id == id)
  }

  pub fn has_category(&self, name: &str) -> bool {
    self.categories.iter().any(|c| c == name)
  }

  /// Videos in `category`, in catalog order. `"All"` returns the whole catalog.
  pub fn filter<'a>(&'a self, category: &str) -> Vec<&'a Video> {
    if category == ALL_CATEGORY {
      self.videos.iter().collect()
    } else {
      self.videos.iter().filter(|v| v.category == category).collect()
    }
  }
}

/// Resolve a catalog URL to something ffmpeg/mpv can open.
///
/// Absolute URLs (`http://`, `https://`, `file://`) pass through untouched.
/// Site-relative paths like `/videos/clip.mp4` are served from `root`.
pub fn resolve_asset(url: &str, root: &Path) -> String {
  if url.starts_with("http://") || url.starts_with("https://") || url.starts_with("file://") {
    return url.to_string();
  }
  let relative = url.trim_start_matches('/');
  let path: PathBuf = root.join(relative);
  path.to_string_lossy().into_owned()
}


#[cfg(test)]
mod tests {
  use super::testing::video;
  use super::*;

  // --- embedded catalog ---

  #[test]
  fn embedded_catalog_matches_site_data() {
    let catalog = Catalog::embedded().unwrap();
    assert_eq!(catalog.len(), 14);
    assert_eq!(catalog.categories, vec!["All", "Full body", "Recipes"]);
    assert_eq!(catalog.first().unwrap().title, "Cinnamon Swirl Protein Pancakes");
    assert_eq!(catalog.filter("Recipe").len(), 7);
    assert_eq!(catalog.filter("Full body").len(), 7);
  }

  #[test]
  fn recipes_button_matches_nothing() {
    // The button says "Recipes" while the clips are tagged "Recipe".
    let catalog = Catalog::embedded().unwrap();
    assert!(catalog.filter("Recipes").is_empty());
  }

  // --- filter ---

  #[test]
  fn filter_all_returns_catalog_unchanged() {
    let catalog = Catalog::embedded().unwrap();
    let all: Vec<&str> = catalog.filter(ALL_CATEGORY).iter().map(|v| v.id.as_str()).collect();
    let expected: Vec<&str> = catalog.videos.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(all, expected);
  }

  #[test]
  fn filter_preserves_catalog_order() {
    let catalog = Catalog {
      categories: vec!["All".into(), "a".into(), "b".into()],
      videos: vec![video("1", "a"), video("2", "b"), video("3", "a"), video("4", "b"), video("5", "a")],
    };
    let ids: Vec<&str> = catalog.filter("a").iter().map(|v| v.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "3", "5"]);
    assert!(catalog.filter("b").iter().all(|v| v.category == "b"));
  }

  // --- validate ---

  #[test]
  fn validate_rejects_duplicate_ids() {
    let catalog = Catalog { categories: vec!["All".into()], videos: vec![video("1", "a"), video("1", "b")] };
    let err = catalog.validate().unwrap_err();
    assert!(err.to_string().contains("duplicate"));
  }

  #[test]
  fn validate_rejects_empty_catalog() {
    let catalog = Catalog { categories: vec!["All".into()], videos: Vec::new() };
    assert!(catalog.validate().is_err());
  }

  #[test]
  fn validate_requires_all_first() {
    let catalog = Catalog { categories: vec!["a".into(), "All".into()], videos: vec![video("1", "a")] };
    assert!(catalog.validate().is_err());
  }

  // --- load ---

  #[test]
  fn load_toml_catalog() {
    let dir = std::env::temp_dir().join(format!("clipgrid-catalog-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("catalog.toml");
    std::fs::write(
      &path,
      r#"
categories = ["All", "Yoga"]

[[videos]]
id = "y1"
title = "Morning flow"
category = "Yoga"
video_url = "https://cdn.example.com/flow.mp4"
"#,
    )
    .unwrap();
    let catalog = Catalog::load(&path).unwrap();
    assert_eq!(catalog.len(), 1);
    assert_eq!(catalog.get("y1").unwrap().title, "Morning flow");
    assert!(catalog.has_category("Yoga"));
    let _ = std::fs::remove_dir_all(&dir);
  }

  #[test]
  fn load_rejects_unknown_extension() {
    let dir = std::env::temp_dir().join(format!("clipgrid-catalog-json-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("catalog.json");
    std::fs::write(&path, r#"{"categories": ["All"], "videos": []}"#).unwrap();

    let err = Catalog::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Unsupported catalog format '.json'"));
    let _ = std::fs::remove_dir_all(&dir);
  }

  // --- resolve_asset ---

  #[test]
  fn resolve_asset_joins_site_relative_paths() {
    let resolved = resolve_asset("/videos/Filet Mignon.mp4", Path::new("public"));
    assert_eq!(PathBuf::from(resolved), Path::new("public").join("videos").join("Filet Mignon.mp4"));
  }

  #[test]
  fn resolve_asset_passes_urls_through() {
    assert_eq!(resolve_asset("https://cdn.example.com/a.mp4", Path::new("public")), "https://cdn.example.com/a.mp4");
    assert_eq!(resolve_asset("file:///tmp/a.mp4", Path::new("public")), "file:///tmp/a.mp4");
  }
}
