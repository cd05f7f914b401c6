//! Configuration: input/output directories and well-known file names.
//!
//! Layered the usual way: compiled-in defaults, an optional TOML file, then
//! environment overrides. The loaded value is passed down from `main`; no
//! module reads configuration on its own.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub files: FilesConfig,
}

/// Directory layout. Input files are resolved relative to `input_dir`,
/// generated reports land under `output_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

/// Well-known file names under the input/output directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Roster CSV with per-employee metadata.
    pub roster: String,
    /// Flat login-to-email JSON mapping.
    pub email_mappings: String,
    /// Month-over-month trend file under the output directory.
    pub trends: String,
    /// Glob matched under the input directory to find a leaderboard export.
    pub leaderboard_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            files: FilesConfig::default(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("AI_Usage_Input"),
            output_dir: PathBuf::from("AI_Usage_Output"),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            roster: "useremails.csv".to_string(),
            email_mappings: "email_to_github_mappings.json".to_string(),
            trends: "fs-eng-ai-usage-trends.csv".to_string(),
            leaderboard_pattern: "*User_Leaderboard*.csv".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file (if present), then apply environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        let config_paths = [
            PathBuf::from("adoption-report.toml"),
            PathBuf::from(".adoption-report.toml"),
        ];
        for path in &config_paths {
            if path.exists() {
                info!(config_file = %path.display(), "loading configuration from file");
                config = Self::load_from_file(path)?;
                break;
            }
        }

        config.apply_env_overrides();
        Ok(config)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("ADOPTION_INPUT_DIR") {
            self.paths.input_dir = PathBuf::from(val);
        }
        if let Ok(val) = env::var("ADOPTION_OUTPUT_DIR") {
            self.paths.output_dir = PathBuf::from(val);
        }
    }

    /// Create the output directory if it does not exist yet.
    pub fn ensure_output_dir(&self) -> Result<()> {
        if !self.paths.output_dir.exists() {
            fs::create_dir_all(&self.paths.output_dir).with_context(|| {
                format!(
                    "Could not create output directory '{}'",
                    self.paths.output_dir.display()
                )
            })?;
        }
        Ok(())
    }

    pub fn input_path(&self, name: &str) -> PathBuf {
        self.paths.input_dir.join(name)
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.paths.output_dir.join(name)
    }

    pub fn roster_path(&self) -> PathBuf {
        self.input_path(&self.files.roster)
    }

    pub fn email_mappings_path(&self) -> PathBuf {
        self.input_path(&self.files.email_mappings)
    }

    pub fn trends_path(&self) -> PathBuf {
        self.output_path(&self.files.trends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_use_standard_directories() {
        let config = Config::default();
        assert_eq!(config.paths.input_dir, PathBuf::from("AI_Usage_Input"));
        assert_eq!(config.paths.output_dir, PathBuf::from("AI_Usage_Output"));
        assert_eq!(
            config.roster_path(),
            PathBuf::from("AI_Usage_Input/useremails.csv")
        );
        assert_eq!(
            config.trends_path(),
            PathBuf::from("AI_Usage_Output/fs-eng-ai-usage-trends.csv")
        );
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("adoption-report.toml");
        std::fs::write(&path, "[paths]\ninput_dir = \"exports\"\n").unwrap();
        let config = Config::load_from_file(&path).unwrap();
        assert_eq!(config.paths.input_dir, PathBuf::from("exports"));
        assert_eq!(config.paths.output_dir, PathBuf::from("AI_Usage_Output"));
        assert_eq!(config.files.roster, "useremails.csv");
    }

    #[test]
    fn env_overrides_win() {
        env::set_var("ADOPTION_INPUT_DIR", "/tmp/in");
        let mut config = Config::default();
        config.apply_env_overrides();
        assert_eq!(config.paths.input_dir, PathBuf::from("/tmp/in"));
        env::remove_var("ADOPTION_INPUT_DIR");
    }
}
