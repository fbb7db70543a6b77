// Persisted engine state. Persistence policy belongs to the host
// application; the engine only receives these values at startup and reads
// them back through its getters for saving.

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::router::Category;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedDevices {
    pub enabled: bool,
    pub output_device: Option<u32>,
    pub input_device: Option<u32>,
}

impl Default for UnifiedDevices {
    fn default() -> Self {
        Self {
            enabled: true,
            output_device: None,
            input_device: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// Active profile name.
    pub name: String,
    pub band_count: usize,
    /// Per-category equalizer gain arrays, dB.
    pub category_gains: HashMap<Category, Vec<f32>>,
    pub output_gain_db: f32,
    /// Session-name -> category overrides, persisted across pid churn.
    pub session_overrides: HashMap<String, Category>,
    pub unified: UnifiedDevices,
    /// UI theme; carried for the host, ignored by the engine.
    pub theme: String,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            name: "Default".to_string(),
            band_count: 10,
            category_gains: HashMap::new(),
            output_gain_db: 0.0,
            session_overrides: HashMap::new(),
            unified: UnifiedDevices::default(),
            theme: "Light".to_string(),
        }
    }
}

impl Profile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).context("Failed to read profile file")?;
        serde_json::from_str(&contents).context("Failed to parse profile")
    }

    /// Load the profile at `path`, falling back to defaults (and writing
    /// them out, best-effort) when the file does not exist yet.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load(path) {
                Ok(profile) => {
                    debug!("loaded profile from {path:?}");
                    return profile;
                }
                Err(e) => {
                    info!("could not load profile ({e}), using defaults");
                }
            }
        } else {
            info!("no profile at {path:?}, using defaults");
        }
        let profile = Self::default();
        let _ = profile.save(path);
        profile
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create profile directory")?;
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize profile")?;
        fs::write(path, json).context("Failed to write profile file")?;

        debug!("saved profile to {path:?}");
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        const PROFILE_FILENAME: &str = "profile.json";

        if let Ok(config_dir) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(config_dir)
                .join("claroute")
                .join(PROFILE_FILENAME)
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("claroute")
                .join(PROFILE_FILENAME)
        } else {
            PathBuf::from(".").join(PROFILE_FILENAME)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut profile = Profile::default();
        profile.name = "Gaming".to_string();
        profile.band_count = 31;
        profile
            .category_gains
            .insert(Category::Game, vec![6.0, 3.0, 0.0]);
        profile
            .session_overrides
            .insert("discord.exe".to_string(), Category::Others);
        profile.unified.output_device = Some(4);

        profile.save(&path).unwrap();
        let loaded = Profile::load(&path).unwrap();

        assert_eq!(loaded.name, "Gaming");
        assert_eq!(loaded.band_count, 31);
        assert_eq!(loaded.category_gains[&Category::Game], vec![6.0, 3.0, 0.0]);
        assert_eq!(loaded.session_overrides["discord.exe"], Category::Others);
        assert_eq!(loaded.unified.output_device, Some(4));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("profile.json");

        let profile = Profile::load_or_default(&path);
        assert_eq!(profile.band_count, 10);
        assert!(profile.unified.enabled);
        // Defaults were written out for next time.
        assert!(path.exists());
    }
}
