use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const SETTINGS_FILE: &str = "samdemo.toml";
pub const DEFAULT_RUN_DIR: &str = "runs";
pub const DEFAULT_CONTENT_LIBRARY: &str = "content_library";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("io error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings in {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Optional `samdemo.toml`. Command-line flags override every field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub seed: Option<u64>,
    pub config: Option<PathBuf>,
    pub content_library: Option<PathBuf>,
    pub anchor_date: Option<NaiveDate>,
    pub run_dir: Option<PathBuf>,
    pub strict: Option<bool>,
}

impl Settings {
    pub fn from_toml_str(path: &Path, content: &str) -> Result<Self, SettingsError> {
        toml::from_str(content).map_err(|source| SettingsError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Load settings from `explicit`, or from `samdemo.toml` in the working
/// directory when present. An explicit path must exist.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, SettingsError> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let default = PathBuf::from(SETTINGS_FILE);
            if !default.exists() {
                return Ok(Settings::default());
            }
            default
        }
    };
    let content = std::fs::read_to_string(&path).map_err(|source| SettingsError::Io {
        path: path.clone(),
        source,
    })?;
    Settings::from_toml_str(&path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_field() {
        let settings = Settings::from_toml_str(
            Path::new("samdemo.toml"),
            r#"
seed = 7
config = "config/distributions.json"
content_library = "library"
anchor_date = "2025-06-30"
run_dir = "out"
strict = true
"#,
        )
        .expect("settings");
        assert_eq!(settings.seed, Some(7));
        assert_eq!(settings.anchor_date, NaiveDate::from_ymd_opt(2025, 6, 30));
        assert_eq!(settings.strict, Some(true));
        assert_eq!(settings.run_dir.as_deref(), Some(Path::new("out")));
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let settings = Settings::from_toml_str(Path::new("samdemo.toml"), "").expect("settings");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Settings::from_toml_str(Path::new("samdemo.toml"), "sead = 1\n")
            .expect_err("typo");
        assert!(err.to_string().contains("samdemo.toml"));
    }
}
