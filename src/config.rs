use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};
use crate::schema::attributes::{IDENTIFIER, MEMBERS, SCHEMAS};

pub const DEFAULT_KEY_COLUMN: &str = "Key";
pub const DEFAULT_FILE_NAME: &str = "Resources.csv";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub store: StoreSection,
    #[serde(default)]
    pub extensions: Vec<ExtensionConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StoreSection {
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default)]
    pub key_column: Option<String>,
}

/// A dynamic resource kind stored alongside Users and Groups
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExtensionConfig {
    pub schema: String,
    pub attributes: Vec<String>,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_file_name() -> String {
    DEFAULT_FILE_NAME.to_string()
}

/// Everything the comma-delimited adapter needs to open its file
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Folder that holds the data file and its `Schema.ini`
    pub directory: PathBuf,
    pub file_name: String,
    pub key_column: String,
    pub extensions: Vec<ExtensionConfig>,
}

impl StoreConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            file_name: DEFAULT_FILE_NAME.to_string(),
            key_column: DEFAULT_KEY_COLUMN.to_string(),
            extensions: Vec::new(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn with_key_column(mut self, key_column: impl Into<String>) -> Self {
        self.key_column = key_column.into();
        self
    }

    pub fn with_extension(mut self, schema: impl Into<String>, attributes: &[&str]) -> Self {
        self.extensions.push(ExtensionConfig {
            schema: schema.into(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        });
        self
    }

    pub fn file_path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    /// Attribute names contributed by the configured extensions, in order
    pub fn extension_attributes(&self) -> Vec<String> {
        self.extensions
            .iter()
            .flat_map(|e| e.attributes.iter().cloned())
            .collect()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.file_name.trim().is_empty() {
            return Err("Data file name cannot be empty".to_string());
        }

        let lower = self.file_name.to_lowercase();
        if !lower.ends_with(".csv") && !lower.ends_with(".txt") {
            return Err("Data file name must end with '.csv' or '.txt'".to_string());
        }

        if self.file_name.contains(['/', '\\', ']', '[']) {
            return Err(format!("Invalid data file name: {}", self.file_name));
        }

        if self.key_column.trim().is_empty() {
            return Err("Key column name cannot be empty".to_string());
        }

        for extension in &self.extensions {
            if extension.schema.trim().is_empty() {
                return Err("Extension schema identifier cannot be empty".to_string());
            }
            for attribute in &extension.attributes {
                if attribute.trim().is_empty() || attribute.contains([',', '"']) {
                    return Err(format!(
                        "Invalid attribute name '{}' in extension {}",
                        attribute, extension.schema
                    ));
                }
                if [IDENTIFIER, SCHEMAS, MEMBERS]
                    .iter()
                    .any(|reserved| attribute.eq_ignore_ascii_case(reserved))
                {
                    return Err(format!(
                        "Attribute name '{}' in extension {} is reserved",
                        attribute, extension.schema
                    ));
                }
            }
        }

        Ok(())
    }
}

impl AppConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| {
            AppError::Configuration(format!(
                "Failed to read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: AppConfig = serde_yaml::from_str(&content)?;
        config
            .store_config()
            .validate()
            .map_err(AppError::Configuration)?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            store: StoreSection {
                directory: default_directory(),
                file_name: default_file_name(),
                key_column: None,
            },
            extensions: Vec::new(),
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            directory: self.store.directory.clone(),
            file_name: self.store.file_name.clone(),
            key_column: self
                .store
                .key_column
                .clone()
                .unwrap_or_else(|| DEFAULT_KEY_COLUMN.to_string()),
            extensions: self.extensions.clone(),
        }
    }
}
