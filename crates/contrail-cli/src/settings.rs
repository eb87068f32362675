//! Layered settings for the `contrail` binary.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use contrail_core::config::EngineConfig;
use serde::Deserialize;

/// Shape of `contrail.toml`. Every key is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub store_path: PathBuf,
  pub engine:     EngineConfig,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      store_path: PathBuf::from("contrail.db"),
      engine:     EngineConfig::default(),
    }
  }
}

impl Settings {
  /// Read `path` (if it exists) under `CONTRAIL_*` environment overrides.
  /// Nested keys use a double underscore, e.g.
  /// `CONTRAIL_ENGINE__REFRESH_AFTER_MINUTES=10`.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    Self::from_builder(
      config::Config::builder().add_source(config::File::from(path).required(false)),
    )
  }

  fn from_builder(
    builder: config::ConfigBuilder<config::builder::DefaultState>,
  ) -> anyhow::Result<Self> {
    let settings = builder
      .add_source(
        config::Environment::with_prefix("CONTRAIL")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?;

    let mut settings: Self = settings
      .try_deserialize()
      .context("failed to deserialise settings")?;
    settings.store_path = expand_tilde(&settings.store_path);
    Ok(settings)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(toml: &str) -> Settings {
    Settings::from_builder(
      config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml)),
    )
    .unwrap()
  }

  #[test]
  fn engine_table_overrides_defaults() {
    let s = parse(
      r#"
      store_path = "/var/lib/contrail/legs.db"

      [engine]
      auto_close_after_minutes = 90
      "#,
    );
    assert_eq!(s.store_path, PathBuf::from("/var/lib/contrail/legs.db"));
    assert_eq!(s.engine.auto_close_after_minutes, 90);
    assert_eq!(s.engine.refresh_after_minutes, 15);
  }

  #[test]
  fn empty_file_uses_defaults() {
    let s = parse("");
    assert_eq!(s.store_path, PathBuf::from("contrail.db"));
    assert_eq!(s.engine, EngineConfig::default());
  }
}
