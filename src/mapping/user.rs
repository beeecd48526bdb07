use super::{blob, boolean, mismatch, put, put_blob, text};
use super::{ColumnsFactory, ResourceFactory, ResourceKind, ResourceMapping};
use crate::backend::{Columns, Row};
use crate::error::{AppError, AppResult};
use crate::models::{EnterpriseExtension, Manager, Name, Resource, User};
use crate::schema::attributes::*;
use crate::schema::{column_for_path, COMMON_COLUMNS, USER_COLUMNS, USER_SCHEMA};

pub struct UserMapping;

impl ColumnsFactory for UserMapping {
    fn create_columns(&self, resource: &Resource) -> AppResult<Columns> {
        let user = resource.as_user().ok_or_else(|| mismatch("User", resource))?;

        let mut columns = Columns::new();
        columns.insert(SCHEMAS.to_string(), USER_SCHEMA.to_string());
        put(&mut columns, EXTERNAL_IDENTIFIER, user.external_id.as_deref());
        put(&mut columns, USER_NAME, Some(user.user_name.as_str()));
        if let Some(active) = user.active {
            columns.insert(ACTIVE.to_string(), active.to_string());
        }
        put(&mut columns, DISPLAY_NAME, user.display_name.as_deref());
        put(&mut columns, TITLE, user.title.as_deref());
        put(&mut columns, PREFERRED_LANGUAGE, user.preferred_language.as_deref());

        if let Some(name) = &user.name {
            put(&mut columns, GIVEN_NAME, name.given_name.as_deref());
            put(&mut columns, FAMILY_NAME, name.family_name.as_deref());
        }

        put_blob(&mut columns, EMAILS, user.emails.as_ref())?;
        put_blob(&mut columns, ADDRESSES, user.addresses.as_ref())?;
        put_blob(&mut columns, PHONE_NUMBERS, user.phone_numbers.as_ref())?;

        if let Some(enterprise) = &user.enterprise {
            put(&mut columns, DEPARTMENT, enterprise.department.as_deref());
            put(&mut columns, EMPLOYEE_NUMBER, enterprise.employee_number.as_deref());
            // Only the manager's identifier is kept so reference queries can compare it directly.
            let manager = enterprise.manager.as_ref().and_then(|m| m.value.as_deref());
            put(&mut columns, MANAGER, manager);
        }

        Ok(columns)
    }
}

impl ResourceFactory for UserMapping {
    fn create_resource(&self, row: &Row) -> AppResult<Resource> {
        let mut user = User {
            id: Some(row.key.clone()),
            external_id: text(row, EXTERNAL_IDENTIFIER),
            user_name: text(row, USER_NAME).unwrap_or_default(),
            active: boolean(row, ACTIVE),
            display_name: text(row, DISPLAY_NAME),
            title: text(row, TITLE),
            preferred_language: text(row, PREFERRED_LANGUAGE),
            emails: blob(row, EMAILS)?,
            addresses: blob(row, ADDRESSES)?,
            phone_numbers: blob(row, PHONE_NUMBERS)?,
            ..Default::default()
        };

        let given_name = text(row, GIVEN_NAME);
        let family_name = text(row, FAMILY_NAME);
        if given_name.is_some() || family_name.is_some() {
            user.name = Some(Name {
                given_name,
                family_name,
            });
        }

        let enterprise = EnterpriseExtension {
            department: text(row, DEPARTMENT),
            employee_number: text(row, EMPLOYEE_NUMBER),
            manager: text(row, MANAGER).map(|value| Manager {
                value: Some(value),
                display_name: None,
            }),
        };
        if !enterprise.is_empty() {
            user.enterprise = Some(enterprise);
        }

        Ok(Resource::User(user))
    }
}

impl ResourceMapping for UserMapping {
    fn kind(&self) -> ResourceKind {
        ResourceKind::User
    }

    fn schema(&self) -> &str {
        USER_SCHEMA
    }

    fn column_for(&self, attribute_path: &str) -> Option<String> {
        column_for_path(attribute_path)
            .filter(|c| *c != MEMBERS)
            .filter(|c| COMMON_COLUMNS.contains(c) || USER_COLUMNS.contains(c))
            .map(str::to_string)
    }

    fn validate(&self, resource: &Resource) -> AppResult<()> {
        let user = resource.as_user().ok_or_else(|| mismatch("User", resource))?;
        if user.user_name.trim().is_empty() {
            return Err(AppError::BadRequest("userName is required".to_string()));
        }
        Ok(())
    }
}
