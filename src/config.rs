use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// User preferences persisted in `prefs.toml`. CLI flags override these.
#[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq)]
pub struct Config {
  pub theme_name: Option<String>,
  pub assets_root: Option<String>,
  pub fallback_thumbnail: Option<String>,
  pub extract_concurrency: Option<usize>,
  pub extract_timeout_secs: Option<u64>,
}

fn config_file() -> Option<PathBuf> {
  ProjectDirs::from("", "", "clipgrid").map(|dirs| dirs.config_dir().join("prefs.toml"))
}

impl Config {
  pub fn load() -> Self {
    if let Some(config_file) = config_file()
      && let Ok(content) = std::fs::read_to_string(config_file)
      && let Ok(config) = Self::parse(&content)
    {
      return config;
    }
    Self::default()
  }

  pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  pub fn save(&self) {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "clipgrid") {
      let config_dir = proj_dirs.config_dir();
      if std::fs::create_dir_all(config_dir).is_ok() {
        let config_file = config_dir.join("prefs.toml");
        if let Ok(content) = toml::to_string(self) {
          let _ = std::fs::write(config_file, content);
        }
      }
    }
  }
}
