use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::LINE_TERMINATOR;
use crate::error::AppResult;
use crate::monitor::{Monitor, MonitorExt};

pub const SCHEMA_FILE_NAME: &str = "Schema.ini";

/// The fixed header of one data file: key column first, then attributes
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSet {
    key_column: String,
    attributes: Vec<String>,
}

impl ColumnSet {
    /// Build the column set, renaming the key column if an attribute claims its name
    pub fn new<I>(key_column: &str, declared: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut attributes: Vec<String> = Vec::new();
        for name in declared {
            if !attributes.contains(&name) {
                attributes.push(name);
            }
        }

        let mut key_column = key_column.to_string();
        while attributes
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&key_column))
        {
            key_column = format!("_{}_", key_column);
        }

        Self {
            key_column,
            attributes,
        }
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    /// True for the key column or any declared attribute
    pub fn contains(&self, name: &str) -> bool {
        name == self.key_column || self.attributes.iter().any(|a| a == name)
    }

    pub fn names(&self) -> Vec<String> {
        std::iter::once(self.key_column.clone())
            .chain(self.attributes.iter().cloned())
            .collect()
    }

    pub fn header_line(&self) -> String {
        self.names().join(",")
    }
}

/// The `Schema.ini` control file describing the data file's format
#[derive(Debug, Clone)]
pub struct SchemaSidecar {
    path: PathBuf,
    data_file_name: String,
}

impl SchemaSidecar {
    pub fn new(directory: &Path, data_file_name: &str) -> Self {
        Self {
            path: directory.join(SCHEMA_FILE_NAME),
            data_file_name: data_file_name.to_string(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn expected_content(&self) -> String {
        format!(
            "[{}]{}Format=CSVDelimited{}",
            self.data_file_name, LINE_TERMINATOR, LINE_TERMINATOR
        )
    }

    /// Regenerate the sidecar unless it already holds the expected declaration
    pub async fn ensure(&self, monitor: &Arc<dyn Monitor>) -> AppResult<()> {
        let expected = self.expected_content();
        match fs::read_to_string(&self.path).await {
            Ok(current) if current == expected => return Ok(()),
            Ok(_) => {
                monitor.warning(
                    None,
                    format!("Schema file {} does not match, regenerating", self.path.display()),
                );
                fs::remove_file(&self.path).await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        fs::write(&self.path, expected).await?;
        Ok(())
    }
}

/// Recreate the data file unless its first line is the expected header
pub async fn ensure_data_file(
    path: &Path,
    columns: &ColumnSet,
    monitor: &Arc<dyn Monitor>,
) -> AppResult<()> {
    let header = columns.header_line();

    match fs::File::open(path).await {
        Ok(file) => {
            let mut lines = BufReader::new(file).lines();
            let first = lines.next_line().await?;
            if first.as_deref().map(|l| l.trim_end_matches('\r')) == Some(header.as_str()) {
                return Ok(());
            }
            monitor.warning(
                None,
                format!(
                    "Header of {} does not match the declared columns, recreating the file",
                    path.display()
                ),
            );
            fs::remove_file(path).await?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    fs::write(path, format!("{}{}", header, LINE_TERMINATOR)).await?;
    monitor.information(None, format!("Created data file {}", path.display()));
    Ok(())
}
