use super::{mismatch, put, text};
use super::{ColumnsFactory, ResourceFactory, ResourceKind, ResourceMapping};
use crate::backend::{Columns, Row};
use crate::error::{AppError, AppResult};
use crate::models::{DynamicResource, Resource};
use crate::schema::attributes::*;
use crate::schema::unqualified_path;

/// Mapping for a configured extension schema with plain string attributes
pub struct DynamicMapping {
    schema: String,
    attributes: Vec<String>,
}

impl DynamicMapping {
    pub fn new(schema: String, attributes: Vec<String>) -> Self {
        Self { schema, attributes }
    }

    pub fn attributes(&self) -> &[String] {
        &self.attributes
    }

    fn declared(&self, name: &str) -> Option<&String> {
        self.attributes.iter().find(|a| a.eq_ignore_ascii_case(name))
    }
}

impl ColumnsFactory for DynamicMapping {
    fn create_columns(&self, resource: &Resource) -> AppResult<Columns> {
        let dynamic = resource
            .as_dynamic()
            .filter(|d| d.schema == self.schema)
            .ok_or_else(|| mismatch(&self.schema, resource))?;

        let mut columns = Columns::new();
        columns.insert(SCHEMAS.to_string(), self.schema.clone());
        put(&mut columns, EXTERNAL_IDENTIFIER, dynamic.external_id.as_deref());
        for (name, value) in &dynamic.attributes {
            let column = self.declared(name).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "Attribute {} is not declared for {}",
                    name, self.schema
                ))
            })?;
            put(&mut columns, column, Some(value.as_str()));
        }
        Ok(columns)
    }
}

impl ResourceFactory for DynamicMapping {
    fn create_resource(&self, row: &Row) -> AppResult<Resource> {
        let mut resource = DynamicResource::new(self.schema.clone());
        resource.id = Some(row.key.clone());
        resource.external_id = text(row, EXTERNAL_IDENTIFIER);
        for name in &self.attributes {
            if let Some(value) = text(row, name) {
                resource.attributes.insert(name.clone(), value);
            }
        }
        Ok(Resource::Dynamic(resource))
    }
}

impl ResourceMapping for DynamicMapping {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Dynamic
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    fn column_for(&self, attribute_path: &str) -> Option<String> {
        let name = unqualified_path(attribute_path.trim());
        if name.eq_ignore_ascii_case(IDENTIFIER) {
            return Some(IDENTIFIER.to_string());
        }
        if name.eq_ignore_ascii_case(EXTERNAL_IDENTIFIER) {
            return Some(EXTERNAL_IDENTIFIER.to_string());
        }
        if name.eq_ignore_ascii_case(SCHEMAS) {
            return Some(SCHEMAS.to_string());
        }
        self.declared(name).cloned()
    }

    fn validate(&self, resource: &Resource) -> AppResult<()> {
        resource
            .as_dynamic()
            .filter(|d| d.schema == self.schema)
            .ok_or_else(|| mismatch(&self.schema, resource))?;
        Ok(())
    }
}
