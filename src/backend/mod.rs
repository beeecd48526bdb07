use crate::config::StoreConfig;
use crate::error::AppResult;
use crate::monitor::Monitor;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod file;
pub mod query;

pub use file::CommaDelimitedFileAdapter;

/// Column name to value; a missing entry and an empty value mean the same thing
pub type Columns = BTreeMap<String, String>;

/// The persisted unit: one resource instance or one group membership edge
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub key: String,
    pub columns: Columns,
}

impl Row {
    pub fn new(key: impl Into<String>, columns: Columns) -> Self {
        Self {
            key: key.into(),
            columns,
        }
    }

    /// Value of a column, treating empty values as absent
    pub fn value(&self, column: &str) -> Option<&str> {
        self.columns
            .get(column)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Drop every empty column
    pub fn reduced(mut self) -> Self {
        self.columns.retain(|_, v| !v.is_empty());
        self
    }
}

/// Keyed row storage behind the provider
///
/// Rows are only ever inserted, removed or replaced whole. Queries are a
/// conjunction of column equality tests.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// Insert a row under a freshly generated key
    async fn insert_row(&self, columns: Columns) -> AppResult<Row>;

    /// Insert a row unless one already equals every given column
    ///
    /// The check and the insert happen as one step, so concurrent callers
    /// with the same columns produce a single row. Returns `None` when a
    /// matching row was already present.
    async fn insert_row_if_absent(&self, columns: Columns) -> AppResult<Option<Row>>;

    /// Point lookup by key
    async fn read_row(&self, key: &str) -> AppResult<Option<Row>>;

    /// All rows whose columns equal every given comparison value
    ///
    /// Each returned row carries only its non-empty columns. An empty
    /// mapping returns every row.
    async fn query(&self, columns: &Columns) -> AppResult<Vec<Row>>;

    /// Remove every row with the key; a missing key is not an error
    async fn remove_row(&self, key: &str) -> AppResult<()>;

    /// Swap the stored columns of an existing row; a missing key is a no-op
    ///
    /// Columns are checked before anything is written, so a rejected
    /// replacement leaves the stored row untouched.
    async fn replace_row(&self, row: &Row) -> AppResult<()>;

    /// Header names, key column first
    fn header(&self) -> Vec<String>;
}

/// Factory for row store instances
pub struct RowStoreFactory;

impl RowStoreFactory {
    pub async fn open(config: &StoreConfig, monitor: Arc<dyn Monitor>) -> AppResult<Arc<dyn RowStore>> {
        let adapter = CommaDelimitedFileAdapter::open(config, monitor).await?;
        Ok(Arc::new(adapter))
    }
}
