use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

pub const DEFAULT_GENERATION: &str = "zerodex-cache-v1";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the app shell is served from; relative manifest entries resolve against it
  pub origin: Url,
  /// Active cache generation; changing it invalidates every stored entry
  #[serde(default = "default_generation")]
  pub generation: String,
  /// App-shell resources to pre-populate on activation
  #[serde(default = "default_manifest")]
  pub manifest: Vec<String>,
  /// Database location (defaults to the platform data directory)
  pub database: Option<PathBuf>,
  #[serde(default)]
  pub network: NetworkConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_user_agent")]
  pub user_agent: String,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
      user_agent: default_user_agent(),
    }
  }
}

fn default_generation() -> String {
  DEFAULT_GENERATION.to_string()
}

fn default_manifest() -> Vec<String> {
  vec!["/".into(), "/index.html".into(), "/style.css".into()]
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_user_agent() -> String {
  concat!("zerodex/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./zerodex.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/zerodex/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/zerodex/config.yaml \
         with at least an `origin:` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("zerodex.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("zerodex").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;

    if config.generation.trim().is_empty() {
      return Err(eyre!("generation must not be empty"));
    }

    Ok(config)
  }

  /// Manifest entries resolved to absolute URLs against the origin.
  pub fn manifest_urls(&self) -> Result<Vec<Url>> {
    self
      .manifest
      .iter()
      .map(|entry| {
        self
          .origin
          .join(entry)
          .map_err(|e| eyre!("Invalid manifest entry '{}': {}", entry, e))
      })
      .collect()
  }

  /// Resolve a locator given on the command line (absolute or origin-relative).
  pub fn resolve_locator(&self, locator: &str) -> Result<Url> {
    self
      .origin
      .join(locator)
      .map_err(|e| eyre!("Invalid locator '{}': {}", locator, e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("origin: https://zerodex.example.com\n").unwrap();

    assert_eq!(config.generation, "zerodex-cache-v1");
    assert_eq!(config.manifest, vec!["/", "/index.html", "/style.css"]);
    assert_eq!(config.network.timeout_secs, 30);
    assert!(config.database.is_none());
  }

  #[test]
  fn test_full_config() {
    let yaml = r#"
origin: https://zerodex.example.com
generation: zerodex-cache-v2
manifest:
  - /
  - /games.json
database: /tmp/zerodex.db
network:
  timeout_secs: 5
"#;
    let config = Config::parse(yaml).unwrap();

    assert_eq!(config.generation, "zerodex-cache-v2");
    assert_eq!(config.database, Some(PathBuf::from("/tmp/zerodex.db")));
    assert_eq!(config.network.timeout_secs, 5);
    assert!(config.network.user_agent.starts_with("zerodex/"));
  }

  #[test]
  fn test_manifest_resolves_against_origin() {
    let yaml = r#"
origin: https://zerodex.example.com/app/
manifest: ["/", "index.html", "https://cdn.example.com/font.woff2"]
"#;
    let config = Config::parse(yaml).unwrap();
    let urls: Vec<String> = config
      .manifest_urls()
      .unwrap()
      .into_iter()
      .map(String::from)
      .collect();

    assert_eq!(
      urls,
      vec![
        "https://zerodex.example.com/",
        "https://zerodex.example.com/app/index.html",
        "https://cdn.example.com/font.woff2",
      ]
    );
  }

  #[test]
  fn test_rejects_bad_config() {
    assert!(Config::parse("generation: v1\n").is_err());
    assert!(Config::parse("origin: https://zerodex.example.com\ngeneration: ' '\n").is_err());
    assert!(Config::parse("origin: not a url\n").is_err());
  }

  #[test]
  fn test_load_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/zerodex.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zerodex.yaml");
    std::fs::write(&path, "origin: https://zerodex.example.com\n").unwrap();

    let config = Config::load(Some(path.as_path())).unwrap();
    assert_eq!(config.origin.as_str(), "https://zerodex.example.com/");
  }
}
