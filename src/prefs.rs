//! Locally persisted user preferences.
//!
//! A small TOML file under the platform config directory with fixed keys:
//! the API token, the collaborator endpoint, and UI flags. Read once at
//! startup, written back whenever a value changes.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChorusError;

pub const PREFS_FILE_NAME: &str = "chorus.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Prefs {
    /// Bearer token sent to the collaborator endpoint.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Overrides the built-in default endpoint when set.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Render thinking text alongside answers.
    #[serde(default)]
    pub show_thinking: bool,
    /// Whether the embedding UI should start gesture tracking.
    #[serde(default)]
    pub gesture_enabled: bool,
}

impl Prefs {
    /// Platform default location (`<config dir>/chorus/chorus.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("chorus").join(PREFS_FILE_NAME))
    }

    /// Load preferences; a missing file yields defaults, a malformed file
    /// is an error (silently resetting would drop the stored token).
    pub fn load(path: &Path) -> Result<Self, ChorusError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                toml::from_str(&raw).map_err(|e| ChorusError::Prefs(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Prefs::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the preferences, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ChorusError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = toml::to_string_pretty(self)
            .map_err(|e| ChorusError::Prefs(e.to_string()))?;
        std::fs::write(path, raw)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prefs = Prefs::load(&dir.path().join("nope.toml")).expect("load");
        assert_eq!(prefs, Prefs::default());
    }

    #[test]
    fn test_save_then_load_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chorus.toml");
        let prefs = Prefs {
            api_token: Some("sk-test-123".to_string()),
            endpoint: Some("http://localhost:9000/api/chat".to_string()),
            show_thinking: true,
            gesture_enabled: false,
        };
        prefs.save(&path).expect("save");
        let back = Prefs::load(&path).expect("load");
        assert_eq!(back, prefs);
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("deeper").join("chorus.toml");
        Prefs::default().save(&path).expect("save");
        assert!(path.exists());
    }

    #[test]
    fn test_fixed_keys_in_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chorus.toml");
        let prefs = Prefs { api_token: Some("tok".to_string()), ..Prefs::default() };
        prefs.save(&path).expect("save");
        let raw = std::fs::read_to_string(&path).expect("read");
        assert!(raw.contains("api_token"));
        assert!(raw.contains("show_thinking"));
        assert!(raw.contains("gesture_enabled"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chorus.toml");
        std::fs::write(&path, "api_token = [not toml").expect("write");
        assert!(matches!(Prefs::load(&path), Err(ChorusError::Prefs(_))));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("chorus.toml");
        std::fs::write(&path, "show_thinking = true\n").expect("write");
        let prefs = Prefs::load(&path).expect("load");
        assert!(prefs.show_thinking);
        assert!(prefs.api_token.is_none());
    }
}
