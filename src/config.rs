//! Configuration for the grading pipeline.
//!
//! Loads settings from config.json at startup. Every field has a default, so a
//! partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Global configuration instance, initialized once at startup.
static CONFIG: OnceLock<GraderConfig> = OnceLock::new();

/// Reference grid drawn on the copy sent to the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Distance between grid lines in pixels
    pub spacing: u32,
    /// Line alpha (0 = invisible, 255 = solid black)
    pub opacity: u8,
    /// Distance of the labels from the top/left edge
    pub label_inset: u32,
    /// Label font size in pixels
    pub label_font_size: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            spacing: 50,
            opacity: 50,
            label_inset: 10,
            label_font_size: 14,
        }
    }
}

/// Checkmark / cross placement and size.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkConfig {
    /// How far left of the reported coordinate the mark starts.
    /// The model tends to report the right edge of the written answer.
    pub offset_x: i32,
    /// Side of the square each mark is drawn in
    pub size: u32,
    /// Font size of the "Score: a/b" text
    pub score_font_size: u32,
    /// Distance of the score text from the top and right edges
    pub score_margin: u32,
}

impl Default for MarkConfig {
    fn default() -> Self {
        Self {
            offset_x: 35,
            size: 40,
            score_font_size: 20,
            score_margin: 20,
        }
    }
}

impl MarkConfig {
    /// Stroke width shared by both mark kinds.
    pub fn thickness(&self) -> u32 {
        (self.size / 8).max(3)
    }
}

/// Upload normalization.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Width every upload is rescaled to
    pub target_width: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self { target_width: 1024 }
    }
}

/// Grading model endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub thinking_budget: u32,
    /// Request timeout; `None` leaves timing entirely to the caller
    pub timeout_secs: Option<u64>,
    /// Instruction sent alongside the grid image
    pub prompt: String,
}

pub const DEFAULT_PROMPT: &str = "grade this. include unanswered problems. \
**The 'correctness' property you return should be true if the student answer is correct \
for that question and false if incorrect**. *Notice that there is a graph overlay. \
Use that to help you approximate coordinates of answers*";

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            thinking_budget: 8000,
            timeout_secs: None,
            prompt: DEFAULT_PROMPT.to_string(),
        }
    }
}

/// Request budget for the model.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    pub counter_id: String,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    /// Counter file; defaults to `<data_dir>/usage_counter.json`
    pub counter_path: Option<PathBuf>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            counter_id: "gemini_api".to_string(),
            daily_limit: 10,
            monthly_limit: 300,
            counter_path: None,
        }
    }
}

impl QuotaConfig {
    pub fn resolved_counter_path(&self) -> PathBuf {
        self.counter_path
            .clone()
            .unwrap_or_else(|| crate::paths::get_data_dir().join("usage_counter.json"))
    }
}

/// Complete grader configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraderConfig {
    pub grid: GridConfig,
    pub marks: MarkConfig,
    pub normalize: NormalizeConfig,
    pub model: ModelConfig,
    pub quota: QuotaConfig,
    /// TrueType font used for labels and score; well-known system fonts are
    /// tried when unset, then the built-in bitmap font.
    pub font_path: Option<PathBuf>,
}

/// Loads configuration from `path`, or from config.json next to the
/// executable, falling back to defaults.
pub fn load_config(path: Option<&Path>) -> GraderConfig {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => crate::paths::get_exe_dir().join("config.json"),
    };

    crate::log(&format!("Looking for config at: {}", config_path.display()));

    if config_path.exists() {
        match fs::read_to_string(&config_path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    crate::log("Config loaded");
                    return config;
                }
                Err(e) => {
                    crate::log(&format!(
                        "Failed to parse {}: {}. Using defaults.",
                        config_path.display(),
                        e
                    ));
                }
            },
            Err(e) => {
                crate::log(&format!(
                    "Failed to read {}: {}. Using defaults.",
                    config_path.display(),
                    e
                ));
            }
        }
    } else {
        crate::log("Config file not found. Using default config.");
    }

    GraderConfig::default()
}

/// Initializes the global configuration. Call once at startup.
pub fn init_config(path: Option<&Path>) {
    let _ = CONFIG.set(load_config(path));
}

/// Returns the global configuration, loading defaults if `init_config` was
/// never called.
pub fn get_config() -> &'static GraderConfig {
    CONFIG.get_or_init(GraderConfig::default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_match_reference_values() {
        let config = GraderConfig::default();
        assert_eq!(config.grid.spacing, 50);
        assert_eq!(config.grid.opacity, 50);
        assert_eq!(config.marks.offset_x, 35);
        assert_eq!(config.marks.size, 40);
        assert_eq!(config.marks.thickness(), 5);
        assert_eq!(config.normalize.target_width, 1024);
        assert_eq!(config.quota.daily_limit, 10);
        assert_eq!(config.quota.monthly_limit, 300);
    }

    #[test]
    fn test_thickness_has_floor() {
        let marks = MarkConfig {
            size: 16,
            ..MarkConfig::default()
        };
        assert_eq!(marks.thickness(), 3);
    }

    #[test]
    fn test_partial_file_overrides_only_named_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "grid": { "spacing": 25 }, "marks": { "size": 64 } }"#).unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.grid.spacing, 25);
        assert_eq!(config.grid.opacity, 50);
        assert_eq!(config.marks.size, 64);
        assert_eq!(config.marks.offset_x, 35);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let config = load_config(Some(&path));
        assert_eq!(config.grid.spacing, 50);
    }
}
