use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::csv::{format_line, parse_line, quote};
use super::layout::{ensure_data_file, ColumnSet, SchemaSidecar};
use super::LINE_TERMINATOR;
use crate::backend::query::RowPredicate;
use crate::backend::{Columns, Row, RowStore};
use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};
use crate::monitor::{Monitor, MonitorExt};
use crate::schema;

/// Row store over a single comma-delimited file
///
/// Mutations (insert, remove, replace) hold the write half of `gate`, so only
/// one runs at a time. Reads hold the read half and therefore never observe a
/// file in the middle of a rewrite. Removal and replacement rewrite into a
/// sibling temporary file and rename it over the original, so a replacement
/// swaps the old line for the new one in a single step.
pub struct CommaDelimitedFileAdapter {
    path: PathBuf,
    file_name: String,
    columns: ColumnSet,
    sidecar: SchemaSidecar,
    gate: RwLock<()>,
    monitor: Arc<dyn Monitor>,
}

impl CommaDelimitedFileAdapter {
    /// Open (and if needed create) the data file and its schema sidecar
    pub async fn open(config: &StoreConfig, monitor: Arc<dyn Monitor>) -> AppResult<Self> {
        config.validate().map_err(AppError::Configuration)?;

        let declared = schema::canonical_columns()
            .into_iter()
            .chain(config.extension_attributes());
        let columns = ColumnSet::new(&config.key_column, declared);

        fs::create_dir_all(&config.directory).await?;

        let path = config.file_path();
        let sidecar = SchemaSidecar::new(&config.directory, &config.file_name);

        ensure_data_file(&path, &columns, &monitor).await?;
        sidecar.ensure(&monitor).await?;

        Ok(Self {
            path,
            file_name: config.file_name.clone(),
            columns,
            sidecar,
            gate: RwLock::new(()),
            monitor,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn column_set(&self) -> &ColumnSet {
        &self.columns
    }

    fn cell<'a>(&self, row: &'a Row, column: &str) -> &'a str {
        if column == self.columns.key_column() {
            &row.key
        } else {
            row.columns.get(column).map(String::as_str).unwrap_or("")
        }
    }

    async fn read_content(&self) -> AppResult<String> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::Configuration(
                format!("Data file {} is missing", self.path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    /// Parse every row of the file; the caller holds the gate
    async fn read_rows(&self) -> AppResult<Vec<Row>> {
        let content = self.read_content().await?;
        let mut lines = content.lines();

        let header = self.columns.header_line();
        if lines.next() != Some(header.as_str()) {
            return Err(AppError::Configuration(format!(
                "Data file {} has an unexpected header",
                self.path.display()
            )));
        }

        let attributes = self.columns.attributes();
        let width = attributes.len() + 1;
        let mut rows = Vec::new();
        for line in lines.filter(|l| !l.is_empty()) {
            let mut cells = parse_line(line)?.into_iter();
            if cells.len() != width {
                return Err(AppError::Configuration(format!(
                    "Row has {} values but {} columns are declared: {}",
                    cells.len(),
                    width,
                    line
                )));
            }

            let key = cells.next().unwrap_or_default();
            let columns: Columns = attributes.iter().cloned().zip(cells).collect();
            rows.push(Row::new(key, columns));
        }
        Ok(rows)
    }

    fn validate_columns<'a, I>(&self, names: I) -> AppResult<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            if !self.columns.contains(name) {
                return Err(AppError::BadRequest(format!("Unknown column: {}", name)));
            }
        }
        Ok(())
    }

    /// Check the columns and build the line for a row without touching the file
    fn prepare_line(&self, key: &str, columns: &Columns) -> AppResult<(String, Columns)> {
        self.validate_columns(columns.keys().map(String::as_str))?;
        if columns.keys().any(|k| k == self.columns.key_column()) {
            return Err(AppError::BadRequest(format!(
                "Column {} is reserved for the row key",
                self.columns.key_column()
            )));
        }
        if let Some((name, _)) = columns.iter().find(|(_, v)| v.contains(['\r', '\n'])) {
            return Err(AppError::BadRequest(format!(
                "Value of {} contains a line break",
                name
            )));
        }

        let full: Columns = self
            .columns
            .attributes()
            .iter()
            .map(|name| (name.clone(), columns.get(name).cloned().unwrap_or_default()))
            .collect();

        let line = format_line(
            std::iter::once(key).chain(
                self.columns
                    .attributes()
                    .iter()
                    .map(|name| full.get(name).map(String::as_str).unwrap_or("")),
            ),
        );

        Ok((line, full))
    }

    /// Append a row under the given key; the caller holds the write gate
    async fn insert_locked(&self, key: String, columns: Columns) -> AppResult<Row> {
        let (line, full) = self.prepare_line(&key, &columns)?;

        let mut file = match fs::OpenOptions::new().append(true).open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::Configuration(format!(
                    "Data file {} is missing",
                    self.path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(format!("{}{}", line, LINE_TERMINATOR).as_bytes())
            .await?;
        file.flush().await?;

        Ok(Row::new(key, full))
    }

    /// Rewrite the file without the key's lines, appending `replacement` when
    /// given; the caller holds the write gate
    ///
    /// Nothing is written when no line carries the key.
    async fn rewrite_locked(&self, key: &str, replacement: Option<&str>) -> AppResult<usize> {
        let content = self.read_content().await?;
        let prefix = format!("{},", quote(key));

        let mut kept: Vec<&str> = Vec::new();
        let mut removed = 0;
        for (index, line) in content.lines().enumerate() {
            if index > 0 && line.starts_with(&prefix) {
                removed += 1;
            } else if !line.is_empty() {
                kept.push(line);
            }
        }

        if removed == 0 {
            return Ok(0);
        }
        kept.extend(replacement);

        let mut rewritten = kept.join(LINE_TERMINATOR);
        rewritten.push_str(LINE_TERMINATOR);

        let temporary = self.path.with_file_name(format!(
            ".{}.{}.tmp",
            self.file_name,
            uuid::Uuid::new_v4()
        ));
        if let Err(e) = write_and_swap(&temporary, &self.path, rewritten.as_bytes()).await {
            let _ = fs::remove_file(&temporary).await;
            return Err(e.into());
        }

        Ok(removed)
    }

}

/// Write `content` to `temporary`, flush it to disk, then rename it over `target`
async fn write_and_swap(temporary: &Path, target: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temporary).await?;
    file.write_all(content).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(temporary, target).await
}

#[async_trait]
impl RowStore for CommaDelimitedFileAdapter {
    async fn insert_row(&self, columns: Columns) -> AppResult<Row> {
        let key = uuid::Uuid::new_v4().to_string();
        let _guard = self.gate.write().await;
        self.insert_locked(key, columns).await
    }

    async fn read_row(&self, key: &str) -> AppResult<Option<Row>> {
        let mut columns = Columns::new();
        columns.insert(self.columns.key_column().to_string(), key.to_string());
        Ok(self.query(&columns).await?.into_iter().next())
    }

    async fn query(&self, columns: &Columns) -> AppResult<Vec<Row>> {
        let predicate = RowPredicate::from_columns(columns);
        self.validate_columns(predicate.column_names())?;
        self.monitor
            .information(None, predicate.to_sql(&self.file_name));

        let rows = {
            let _guard = self.gate.read().await;
            self.read_rows().await?
        };

        Ok(rows
            .into_iter()
            .filter(|row| predicate.matches(|name| self.cell(row, name)))
            .map(Row::reduced)
            .collect())
    }

    async fn remove_row(&self, key: &str) -> AppResult<()> {
        let _guard = self.gate.write().await;
        let removed = self.rewrite_locked(key, None).await?;
        if removed > 0 {
            self.monitor
                .information(None, format!("Removed {} line(s) for key {}", removed, key));
        }
        Ok(())
    }

    async fn insert_row_if_absent(&self, columns: Columns) -> AppResult<Option<Row>> {
        let predicate = RowPredicate::from_columns(&columns);
        self.validate_columns(predicate.column_names())?;

        let key = uuid::Uuid::new_v4().to_string();
        let _guard = self.gate.write().await;
        let present = self
            .read_rows()
            .await?
            .iter()
            .any(|row| predicate.matches(|name| self.cell(row, name)));
        if present {
            return Ok(None);
        }

        self.insert_locked(key, columns).await.map(Some)
    }

    async fn replace_row(&self, row: &Row) -> AppResult<()> {
        let (line, _) = self.prepare_line(&row.key, &row.columns)?;

        let _guard = self.gate.write().await;
        if self.rewrite_locked(&row.key, Some(&line)).await? == 0 {
            self.monitor.information(
                None,
                format!("Row {} does not exist, nothing to replace", row.key),
            );
        }
        Ok(())
    }

    fn header(&self) -> Vec<String> {
        self.columns.names()
    }
}

impl Drop for CommaDelimitedFileAdapter {
    fn drop(&mut self) {
        match std::fs::remove_file(self.sidecar.path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => self.monitor.warning(
                None,
                format!(
                    "Failed to delete schema file {}: {}",
                    self.sidecar.path().display(),
                    e
                ),
            ),
        }
    }
}
