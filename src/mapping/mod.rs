//! Bidirectional mapping between resources and flat rows
//!
//! Each resource kind registers one `ResourceMapping`, which is both the
//! columns factory (resource to columns) and the resource factory (row to
//! resource) for that kind. The registry is built once from the configured
//! schemas and resolves a schema identifier to its mapping.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::backend::{Columns, Row};
use crate::config::StoreConfig;
use crate::error::{AppError, AppResult};
use crate::models::Resource;
use crate::schema::attributes::SCHEMAS;

pub mod dynamic;
pub mod group;
pub mod user;

pub use dynamic::DynamicMapping;
pub use group::GroupMapping;
pub use user::UserMapping;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    User,
    Group,
    Dynamic,
}

pub trait ColumnsFactory: Send + Sync {
    /// Project the resource's non-empty attributes onto columns, stamping its schema tag
    fn create_columns(&self, resource: &Resource) -> AppResult<Columns>;
}

pub trait ResourceFactory: Send + Sync {
    /// Rebuild a resource from a row; absent columns leave attributes unset
    fn create_resource(&self, row: &Row) -> AppResult<Resource>;
}

pub trait ResourceMapping: ColumnsFactory + ResourceFactory {
    fn kind(&self) -> ResourceKind;

    /// Schema tag written to, and expected in, the `schemas` column
    fn schema(&self) -> &str;

    /// Column that stores the given attribute path for this kind
    fn column_for(&self, attribute_path: &str) -> Option<String>;

    /// Check required identifying attributes before anything is stored
    fn validate(&self, resource: &Resource) -> AppResult<()>;

    /// True when the row carries this kind's schema tag
    fn owns(&self, row: &Row) -> bool {
        row.value(SCHEMAS) == Some(self.schema())
    }
}

pub struct MappingRegistry {
    mappings: HashMap<String, Arc<dyn ResourceMapping>>,
}

impl MappingRegistry {
    /// Users, Groups and one dynamic mapping per configured extension
    pub fn from_config(config: &StoreConfig) -> Self {
        let mut registry = Self {
            mappings: HashMap::new(),
        };
        registry.register(Arc::new(UserMapping));
        registry.register(Arc::new(GroupMapping));
        for extension in &config.extensions {
            registry.register(Arc::new(DynamicMapping::new(
                extension.schema.clone(),
                extension.attributes.clone(),
            )));
        }
        registry
    }

    pub fn register(&mut self, mapping: Arc<dyn ResourceMapping>) {
        self.mappings.insert(mapping.schema().to_string(), mapping);
    }

    pub fn resolve(&self, schema_identifier: &str) -> AppResult<Arc<dyn ResourceMapping>> {
        self.mappings
            .get(schema_identifier)
            .cloned()
            .ok_or_else(|| {
                AppError::NotSupported(format!("Schema {} is not supported", schema_identifier))
            })
    }

    pub fn schemas(&self) -> Vec<&str> {
        let mut schemas: Vec<&str> = self.mappings.keys().map(String::as_str).collect();
        schemas.sort();
        schemas
    }
}

/// Insert the value when it is present and non-empty
pub(crate) fn put(columns: &mut Columns, name: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        columns.insert(name.to_string(), value.to_string());
    }
}

/// Serialize a non-empty collection as one structured-text column
pub(crate) fn put_blob<T: Serialize>(
    columns: &mut Columns,
    name: &str,
    items: Option<&Vec<T>>,
) -> AppResult<()> {
    if let Some(items) = items.filter(|i| !i.is_empty()) {
        columns.insert(name.to_string(), serde_json::to_string(items)?);
    }
    Ok(())
}

pub(crate) fn text(row: &Row, name: &str) -> Option<String> {
    row.value(name).map(str::to_string)
}

pub(crate) fn blob<T: DeserializeOwned>(row: &Row, name: &str) -> AppResult<Option<Vec<T>>> {
    match row.value(name) {
        Some(raw) => Ok(Some(serde_json::from_str(raw)?)),
        None => Ok(None),
    }
}

pub(crate) fn boolean(row: &Row, name: &str) -> Option<bool> {
    match row.value(name) {
        Some(v) if v.eq_ignore_ascii_case("true") => Some(true),
        Some(v) if v.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

pub(crate) fn mismatch(expected: &str, resource: &Resource) -> AppError {
    AppError::BadRequest(format!(
        "Expected a {} resource but received {}",
        expected,
        resource.schema()
    ))
}
