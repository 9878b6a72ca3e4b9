use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TaskflowError};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaletteColor {
    pub name: String,
    pub value: String,
}

impl PaletteColor {
    fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Immutable application configuration.
///
/// Handed to the aggregate at construction time so tests can swap the palette, the seed
/// categories or the length limits without touching any global state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_max_task_length")]
    pub max_task_length: usize,
    #[serde(default = "default_max_category_length")]
    pub max_category_length: usize,
    #[serde(default = "default_palette")]
    pub palette: Vec<PaletteColor>,
    #[serde(default = "default_categories")]
    pub default_categories: Vec<String>,
    #[serde(default = "default_auto_save_interval_secs")]
    pub auto_save_interval_secs: u64,
    #[serde(default = "default_export_prefix")]
    pub export_prefix: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            version: default_version(),
            max_task_length: default_max_task_length(),
            max_category_length: default_max_category_length(),
            palette: default_palette(),
            default_categories: default_categories(),
            auto_save_interval_secs: default_auto_save_interval_secs(),
            export_prefix: default_export_prefix(),
        }
    }
}

impl AppConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: AppConfig = serde_json::from_str(raw).map_err(|err| TaskflowError::Config {
            reason: format!("json error: {err}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON config file. A missing file is not an error and yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_json_str(&raw),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(err) => Err(TaskflowError::Config {
                reason: format!("io error: {err}"),
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut problems = Vec::new();
        if self.storage_key.trim().is_empty() {
            problems.push("storage_key must not be empty");
        }
        if self.palette.is_empty() {
            problems.push("palette must contain at least one color");
        }
        if self.max_task_length == 0 {
            problems.push("max_task_length must be positive");
        }
        if self.max_category_length == 0 {
            problems.push("max_category_length must be positive");
        }
        if self.auto_save_interval_secs == 0 {
            problems.push("auto_save_interval_secs must be positive");
        }
        if problems.is_empty() {
            return Ok(());
        }
        Err(TaskflowError::Config {
            reason: problems.join(", "),
        })
    }

    /// First palette entry, used whenever a task or category is created without a color.
    pub fn default_color(&self) -> &str {
        self.palette
            .first()
            .map(|color| color.value.as_str())
            .unwrap_or(FALLBACK_COLOR)
    }

    pub fn auto_save_interval(&self) -> Duration {
        Duration::from_secs(self.auto_save_interval_secs)
    }
}

const FALLBACK_COLOR: &str = "#3B82F6";

fn default_storage_key() -> String {
    "todoapp_data".to_string()
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_max_task_length() -> usize {
    200
}

fn default_max_category_length() -> usize {
    50
}

fn default_palette() -> Vec<PaletteColor> {
    vec![
        PaletteColor::new("Blue", "#3B82F6"),
        PaletteColor::new("Green", "#10B981"),
        PaletteColor::new("Purple", "#8B5CF6"),
        PaletteColor::new("Red", "#EF4444"),
        PaletteColor::new("Yellow", "#F59E0B"),
        PaletteColor::new("Pink", "#EC4899"),
        PaletteColor::new("Indigo", "#6366F1"),
        PaletteColor::new("Gray", "#6B7280"),
    ]
}

fn default_categories() -> Vec<String> {
    ["Websites", "Projects", "Personal", "Work"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

fn default_auto_save_interval_secs() -> u64 {
    30
}

fn default_export_prefix() -> String {
    "todoapp".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.storage_key, "todoapp_data");
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.max_task_length, 200);
        assert_eq!(config.max_category_length, 50);
        assert_eq!(config.palette.len(), 8);
        assert_eq!(config.default_color(), "#3B82F6");
        assert_eq!(
            config.default_categories,
            vec!["Websites", "Projects", "Personal", "Work"]
        );
        assert_eq!(config.auto_save_interval(), Duration::from_secs(30));
        assert_eq!(config.export_prefix, "todoapp");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn config_serde_applies_defaults_for_missing_fields() {
        let json = r#"
        {
          "storage_key": "custom_slot",
          "max_task_length": 20,
          "default_categories": ["Inbox"]
        }
        "#;

        let config = AppConfig::from_json_str(json).expect("config should deserialize");
        assert_eq!(config.storage_key, "custom_slot");
        assert_eq!(config.max_task_length, 20);
        assert_eq!(config.default_categories, vec!["Inbox"]);

        // These fields must be filled by serde defaults.
        assert_eq!(config.version, "1.0.0");
        assert_eq!(config.max_category_length, 50);
        assert_eq!(config.palette, default_palette());
        assert_eq!(config.auto_save_interval_secs, 30);
    }

    #[test]
    fn validate_lists_every_problem() {
        let config = AppConfig {
            storage_key: "  ".to_string(),
            palette: Vec::new(),
            auto_save_interval_secs: 0,
            ..AppConfig::default()
        };
        let err = config.validate().expect_err("config is invalid");
        let message = err.to_string();
        assert!(message.contains("storage_key"));
        assert!(message.contains("palette"));
        assert!(message.contains("auto_save_interval_secs"));
        assert_eq!(config.default_color(), FALLBACK_COLOR);
    }

    #[test]
    fn from_json_str_rejects_malformed_input() {
        let err = AppConfig::from_json_str("{ not json").expect_err("malformed");
        assert!(matches!(err, TaskflowError::Config { .. }));
    }

    #[test]
    fn load_falls_back_to_defaults_when_file_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, AppConfig::default());

        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "version": "2.0.0" }"#).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.version, "2.0.0");
    }
}
