//! Editable config documents: the payload carried by history snapshots.
//!
//! Parsing and rendering the on-disk formats happens elsewhere; these types
//! only hold the parsed settings.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fs::file_name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigFormat {
    Toml,
    Json,
    Json5,
    Yaml,
    Cfg,
    Properties,
}

impl ConfigFormat {
    /// Guess the format from a file extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let (_, ext) = file_name(path).rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "json5" => Some(Self::Json5),
            "yaml" | "yml" => Some(Self::Yaml),
            "cfg" => Some(Self::Cfg),
            "properties" => Some(Self::Properties),
            _ => None,
        }
    }
}

/// A single named value within a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSetting {
    pub key: String,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl ConfigSetting {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
            default_value: None,
            section: None,
            comment: None,
        }
    }
}

/// One parsed config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// File name shown to the user
    pub name: String,
    pub path: String,
    pub format: ConfigFormat,
    pub settings: Vec<ConfigSetting>,
}

impl ConfigFile {
    pub fn new(path: impl Into<String>, format: ConfigFormat) -> Self {
        let path = path.into();
        Self {
            name: file_name(&path).to_string(),
            path,
            format,
            settings: Vec::new(),
        }
    }

    pub fn with_setting(mut self, setting: ConfigSetting) -> Self {
        self.settings.push(setting);
        self
    }

    pub fn setting(&self, key: &str) -> Option<&ConfigSetting> {
        self.settings.iter().find(|s| s.key == key)
    }

    pub fn setting_mut(&mut self, key: &str) -> Option<&mut ConfigSetting> {
        self.settings.iter_mut().find(|s| s.key == key)
    }
}
