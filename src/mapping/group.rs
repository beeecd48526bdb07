use super::{mismatch, put, text};
use super::{ColumnsFactory, ResourceFactory, ResourceKind, ResourceMapping};
use crate::backend::{Columns, Row};
use crate::error::{AppError, AppResult};
use crate::models::{Group, Resource};
use crate::schema::attributes::*;
use crate::schema::{column_for_path, COMMON_COLUMNS, GROUP_COLUMNS, GROUP_SCHEMA};

/// Group rows never carry members; those live in membership rows
pub struct GroupMapping;

impl ColumnsFactory for GroupMapping {
    fn create_columns(&self, resource: &Resource) -> AppResult<Columns> {
        let group = resource.as_group().ok_or_else(|| mismatch("Group", resource))?;

        let mut columns = Columns::new();
        columns.insert(SCHEMAS.to_string(), GROUP_SCHEMA.to_string());
        put(&mut columns, EXTERNAL_IDENTIFIER, group.external_id.as_deref());
        put(&mut columns, DISPLAY_NAME, Some(group.display_name.as_str()));
        Ok(columns)
    }
}

impl ResourceFactory for GroupMapping {
    fn create_resource(&self, row: &Row) -> AppResult<Resource> {
        Ok(Resource::Group(Group {
            id: Some(row.key.clone()),
            external_id: text(row, EXTERNAL_IDENTIFIER),
            display_name: text(row, DISPLAY_NAME).unwrap_or_default(),
            members: None,
        }))
    }
}

impl ResourceMapping for GroupMapping {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Group
    }

    fn schema(&self) -> &str {
        GROUP_SCHEMA
    }

    fn column_for(&self, attribute_path: &str) -> Option<String> {
        column_for_path(attribute_path)
            .filter(|c| COMMON_COLUMNS.contains(c) || GROUP_COLUMNS.contains(c))
            .map(str::to_string)
    }

    fn validate(&self, resource: &Resource) -> AppResult<()> {
        let group = resource.as_group().ok_or_else(|| mismatch("Group", resource))?;
        if group.display_name.trim().is_empty() {
            return Err(AppError::BadRequest("displayName is required".to_string()));
        }
        if let Some(members) = &group.members {
            if members.iter().any(|m| m.value.trim().is_empty()) {
                return Err(AppError::BadRequest(
                    "Group members must have a value".to_string(),
                ));
            }
        }
        Ok(())
    }
}
