//! Applies SCIM PATCH operations to an in-memory resource
//!
//! The engine only mutates the resource. Operations on a Group's `members`
//! are not applied to the resource at all; they come back as
//! `MembershipChange`s for the caller to carry out against membership rows.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::{AppError, AppResult};
use crate::mapping::ResourceMapping;
use crate::models::{
    AttributePath, ComparisonOperator, DynamicResource, EnterpriseExtension, Group, Manager, Name,
    PatchOperation, Resource, User,
};
use crate::schema::attributes::*;
use crate::schema::unqualified_path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationName {
    Add,
    Replace,
    Remove,
}

impl FromStr for OperationName {
    type Err = AppError;

    fn from_str(op: &str) -> Result<Self, Self::Err> {
        match op.to_lowercase().as_str() {
            "add" => Ok(OperationName::Add),
            "replace" => Ok(OperationName::Replace),
            "remove" => Ok(OperationName::Remove),
            _ => Err(AppError::NotSupported(format!(
                "Patch operation '{}' is not supported",
                op
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipChange {
    Add(String),
    Remove(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub resource: Resource,
    pub membership: Vec<MembershipChange>,
}

pub struct PatchEngine;

impl PatchEngine {
    /// Apply the operations in order; `None` or an empty list leaves the resource unchanged
    pub fn apply(
        mapping: &dyn ResourceMapping,
        resource: Resource,
        operations: Option<&[PatchOperation]>,
    ) -> AppResult<PatchOutcome> {
        let mut outcome = PatchOutcome {
            resource,
            membership: Vec::new(),
        };

        for operation in operations.unwrap_or_default() {
            let name = OperationName::from_str(&operation.op)?;
            match &operation.path {
                Some(path) => {
                    Self::apply_path(mapping, &mut outcome, name, path, &operation.value)?
                }
                None => Self::apply_without_path(mapping, &mut outcome, name, &operation.value)?,
            }
        }

        Ok(outcome)
    }

    /// A path-less add/replace carries an object whose members are attribute paths
    fn apply_without_path(
        mapping: &dyn ResourceMapping,
        outcome: &mut PatchOutcome,
        name: OperationName,
        values: &[Value],
    ) -> AppResult<()> {
        if name == OperationName::Remove {
            return Err(AppError::BadRequest("Remove requires a path".to_string()));
        }

        for value in values {
            let object = value.as_object().ok_or_else(|| {
                AppError::BadRequest("A patch without a path must carry an object".to_string())
            })?;
            for (attribute, attribute_value) in object {
                // A schema-keyed object (`{"urn:...:User": {...}}`) holds extension attributes
                let nested = match attribute_value {
                    Value::Object(inner) if attribute.to_lowercase().starts_with("urn:") => inner,
                    _ => {
                        Self::apply_value(mapping, outcome, name, attribute, attribute_value)?;
                        continue;
                    }
                };
                for (inner, inner_value) in nested {
                    Self::apply_value(mapping, outcome, name, inner, inner_value)?;
                }
            }
        }
        Ok(())
    }

    fn apply_value(
        mapping: &dyn ResourceMapping,
        outcome: &mut PatchOutcome,
        name: OperationName,
        attribute: &str,
        value: &Value,
    ) -> AppResult<()> {
        let path = AttributePath::attribute(attribute);
        let values = match value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        Self::apply_path(mapping, outcome, name, &path, &values)
    }

    fn apply_path(
        mapping: &dyn ResourceMapping,
        outcome: &mut PatchOutcome,
        name: OperationName,
        path: &AttributePath,
        values: &[Value],
    ) -> AppResult<()> {
        let path = normalize(path);
        match &mut outcome.resource {
            Resource::User(user) => apply_user(user, name, &path, values),
            Resource::Group(group) => {
                apply_group(group, name, &path, values, &mut outcome.membership)
            }
            Resource::Dynamic(resource) => apply_dynamic(mapping, resource, name, &path, values),
        }
    }
}

/// Split `name.givenName` style attributes into attribute and sub-attribute
fn normalize(path: &AttributePath) -> AttributePath {
    let mut normalized = path.clone();
    let attribute = unqualified_path(&path.attribute).to_string();
    match attribute.split_once('.') {
        Some((head, tail)) if path.sub_attribute.is_none() => {
            normalized.attribute = head.to_string();
            normalized.sub_attribute = Some(tail.to_string());
        }
        _ => normalized.attribute = attribute,
    }
    normalized
}

fn unsupported_path(path: &AttributePath) -> AppError {
    AppError::NotSupported(format!("Patch path '{}' is not supported", path))
}

fn first_value<'a>(values: &'a [Value], path: &AttributePath) -> AppResult<&'a Value> {
    values
        .first()
        .ok_or_else(|| AppError::BadRequest(format!("Patch of '{}' requires a value", path)))
}

/// Read a scalar value, accepting `"x"`, numbers, booleans or `{"value": "x"}`
fn string_value(values: &[Value], path: &AttributePath) -> AppResult<String> {
    match first_value(values, path)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Object(o) => match o.get(VALUE) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(AppError::BadRequest(format!(
                "Patch of '{}' requires a value attribute",
                path
            ))),
        },
        _ => Err(AppError::BadRequest(format!(
            "Patch of '{}' requires a scalar value",
            path
        ))),
    }
}

fn bool_value(values: &[Value], path: &AttributePath) -> AppResult<bool> {
    match first_value(values, path)? {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        _ => Err(AppError::BadRequest(format!(
            "Patch of '{}' requires a boolean value",
            path
        ))),
    }
}

/// Set or clear an optional string attribute
fn set_optional(
    target: &mut Option<String>,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    *target = match name {
        OperationName::Remove => None,
        OperationName::Add | OperationName::Replace => Some(string_value(values, path)?),
    };
    Ok(())
}

fn set_required(
    target: &mut String,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    match name {
        OperationName::Remove => Err(AppError::BadRequest(format!(
            "Required attribute '{}' cannot be removed",
            path
        ))),
        OperationName::Add | OperationName::Replace => {
            *target = string_value(values, path)?;
            Ok(())
        }
    }
}

fn apply_user(
    user: &mut User,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    let attribute = path.attribute.to_lowercase();
    let scalar = path.value_filter.is_none() && path.sub_attribute.is_none();

    match attribute.as_str() {
        "username" if scalar => set_required(&mut user.user_name, name, path, values),
        "externalid" if scalar => set_optional(&mut user.external_id, name, path, values),
        "displayname" if scalar => set_optional(&mut user.display_name, name, path, values),
        "title" if scalar => set_optional(&mut user.title, name, path, values),
        "preferredlanguage" if scalar => {
            set_optional(&mut user.preferred_language, name, path, values)
        }
        "active" if scalar => {
            user.active = match name {
                OperationName::Remove => None,
                _ => Some(bool_value(values, path)?),
            };
            Ok(())
        }
        "name" if path.value_filter.is_none() => apply_name(user, name, path, values),
        "emails" => apply_multi_valued(&mut user.emails, name, path, values),
        "addresses" => apply_multi_valued(&mut user.addresses, name, path, values),
        "phonenumbers" => apply_multi_valued(&mut user.phone_numbers, name, path, values),
        "department" | "employeenumber" | "manager" => {
            let enterprise = user.enterprise.get_or_insert_with(EnterpriseExtension::default);
            apply_enterprise(enterprise, &attribute, name, path, values)?;
            if enterprise.is_empty() {
                user.enterprise = None;
            }
            Ok(())
        }
        _ => Err(unsupported_path(path)),
    }
}

fn apply_name(
    user: &mut User,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    match path.sub_attribute.as_deref().map(str::to_lowercase).as_deref() {
        None => match name {
            OperationName::Remove => user.name = None,
            OperationName::Add | OperationName::Replace => {
                let patch: Name = serde_json::from_value(first_value(values, path)?.clone())?;
                let current = user.name.get_or_insert_with(Name::default);
                if name == OperationName::Replace {
                    *current = patch;
                } else {
                    if patch.given_name.is_some() {
                        current.given_name = patch.given_name;
                    }
                    if patch.family_name.is_some() {
                        current.family_name = patch.family_name;
                    }
                }
            }
        },
        Some("givenname") => {
            let current = user.name.get_or_insert_with(Name::default);
            set_optional(&mut current.given_name, name, path, values)?;
        }
        Some("familyname") => {
            let current = user.name.get_or_insert_with(Name::default);
            set_optional(&mut current.family_name, name, path, values)?;
        }
        Some(_) => return Err(unsupported_path(path)),
    }

    if user
        .name
        .as_ref()
        .is_some_and(|n| n.given_name.is_none() && n.family_name.is_none())
    {
        user.name = None;
    }
    Ok(())
}

fn apply_enterprise(
    enterprise: &mut EnterpriseExtension,
    attribute: &str,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    if path.value_filter.is_some() {
        return Err(unsupported_path(path));
    }

    match attribute {
        "department" if path.sub_attribute.is_none() => {
            set_optional(&mut enterprise.department, name, path, values)
        }
        "employeenumber" if path.sub_attribute.is_none() => {
            set_optional(&mut enterprise.employee_number, name, path, values)
        }
        "manager" => {
            let sub = path.sub_attribute.as_deref();
            if sub.is_some_and(|s| !s.eq_ignore_ascii_case(VALUE)) {
                return Err(unsupported_path(path));
            }
            enterprise.manager = match name {
                OperationName::Remove => None,
                OperationName::Add | OperationName::Replace => Some(Manager {
                    value: Some(string_value(values, path)?),
                    display_name: None,
                }),
            };
            Ok(())
        }
        _ => Err(unsupported_path(path)),
    }
}

/// Items of a multi-valued attribute selected by an `attribute eq "value"` filter
fn selects(item: &Value, path: &AttributePath) -> AppResult<bool> {
    let Some(filter) = &path.value_filter else {
        return Ok(true);
    };
    if filter.comparison_operator != ComparisonOperator::Equals || filter.additional_filter.is_some()
    {
        return Err(unsupported_path(path));
    }

    Ok(match item.get(&filter.attribute_path) {
        Some(Value::String(s)) => s.eq_ignore_ascii_case(&filter.comparison_value),
        Some(Value::Bool(b)) => b.to_string().eq_ignore_ascii_case(&filter.comparison_value),
        _ => false,
    })
}

/// Wrap bare strings as `{"value": ...}` items
fn as_item(value: &Value) -> AppResult<Map<String, Value>> {
    match value {
        Value::Object(o) => Ok(o.clone()),
        Value::String(s) => {
            let mut item = Map::new();
            item.insert(VALUE.to_string(), Value::String(s.clone()));
            Ok(item)
        }
        other => Err(AppError::BadRequest(format!(
            "Unsupported multi-valued item: {}",
            other
        ))),
    }
}

/// A new item satisfying the path's filter, e.g. `{"type": "work"}`
fn seeded_item(path: &AttributePath) -> Map<String, Value> {
    let mut item = Map::new();
    if let Some(filter) = &path.value_filter {
        item.insert(
            filter.attribute_path.clone(),
            Value::String(filter.comparison_value.clone()),
        );
    }
    item
}

fn apply_multi_valued<T>(
    target: &mut Option<Vec<T>>,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()>
where
    T: Serialize + DeserializeOwned,
{
    let mut items: Vec<Value> = match target.take() {
        Some(current) => current
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<_, _>>()?,
        None => Vec::new(),
    };

    let filtered = path.value_filter.is_some();
    match (name, filtered, path.sub_attribute.as_deref()) {
        (OperationName::Add, false, None) => {
            for value in values {
                items.push(Value::Object(as_item(value)?));
            }
        }
        (OperationName::Replace, false, None) => {
            items = values
                .iter()
                .map(|v| as_item(v).map(Value::Object))
                .collect::<AppResult<_>>()?;
        }
        (OperationName::Remove, false, None) => items.clear(),
        (OperationName::Remove, true, None) => {
            let mut kept = Vec::new();
            for item in items {
                if !selects(&item, path)? {
                    kept.push(item);
                }
            }
            items = kept;
        }
        (OperationName::Add | OperationName::Replace, true, None) => {
            let patch = as_item(first_value(values, path)?)?;
            let mut matched = false;
            for item in items.iter_mut() {
                if selects(item, path)? {
                    matched = true;
                    if let Value::Object(object) = item {
                        if name == OperationName::Replace {
                            let mut replaced = seeded_item(path);
                            replaced.extend(patch.clone());
                            *object = replaced;
                        } else {
                            object.extend(patch.clone());
                        }
                    }
                }
            }
            if !matched {
                let mut item = seeded_item(path);
                item.extend(patch);
                items.push(Value::Object(item));
            }
        }
        (_, true, Some(sub)) => {
            let mut matched = false;
            for item in items.iter_mut() {
                if selects(item, path)? {
                    matched = true;
                    if let Value::Object(object) = item {
                        if name == OperationName::Remove {
                            object.remove(sub);
                        } else {
                            object.insert(sub.to_string(), first_value(values, path)?.clone());
                        }
                    }
                }
            }
            if !matched && name != OperationName::Remove {
                let mut item = seeded_item(path);
                item.insert(sub.to_string(), first_value(values, path)?.clone());
                items.push(Value::Object(item));
            }
        }
        (_, false, Some(_)) => return Err(unsupported_path(path)),
    }

    *target = if items.is_empty() {
        None
    } else {
        Some(
            items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<Result<_, _>>()?,
        )
    };
    Ok(())
}

fn member_values(values: &[Value], path: &AttributePath) -> AppResult<Vec<String>> {
    let mut members = Vec::new();
    if let Some(filter) = &path.value_filter {
        if filter.comparison_operator != ComparisonOperator::Equals
            || !filter.attribute_path.eq_ignore_ascii_case(VALUE)
        {
            return Err(unsupported_path(path));
        }
        members.push(filter.comparison_value.clone());
    }

    for value in values {
        let member = match value {
            Value::String(s) => s.clone(),
            Value::Object(o) => match o.get(VALUE) {
                Some(Value::String(s)) => s.clone(),
                _ => {
                    return Err(AppError::BadRequest(
                        "Member values must carry a value attribute".to_string(),
                    ))
                }
            },
            _ => {
                return Err(AppError::BadRequest(format!(
                    "Unsupported member value: {}",
                    value
                )))
            }
        };
        if member.trim().is_empty() {
            return Err(AppError::BadRequest("Member value cannot be empty".to_string()));
        }
        members.push(member);
    }
    Ok(members)
}

fn apply_group(
    group: &mut Group,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
    membership: &mut Vec<MembershipChange>,
) -> AppResult<()> {
    let attribute = path.attribute.to_lowercase();
    let scalar = path.value_filter.is_none() && path.sub_attribute.is_none();

    match attribute.as_str() {
        "displayname" if scalar => set_required(&mut group.display_name, name, path, values),
        "externalid" if scalar => set_optional(&mut group.external_id, name, path, values),
        "members" if path.sub_attribute.is_none() => {
            let members = member_values(values, path)?;
            match name {
                OperationName::Add => {
                    membership.extend(members.into_iter().map(MembershipChange::Add))
                }
                OperationName::Remove => {
                    membership.extend(members.into_iter().map(MembershipChange::Remove))
                }
                OperationName::Replace => {
                    return Err(AppError::NotSupported(format!(
                        "Operation 'replace' is not supported for '{}'",
                        path
                    )))
                }
            }
            Ok(())
        }
        _ => Err(unsupported_path(path)),
    }
}

fn apply_dynamic(
    mapping: &dyn ResourceMapping,
    resource: &mut DynamicResource,
    name: OperationName,
    path: &AttributePath,
    values: &[Value],
) -> AppResult<()> {
    if path.value_filter.is_some() || path.sub_attribute.is_some() {
        return Err(unsupported_path(path));
    }
    if path.attribute.eq_ignore_ascii_case(EXTERNAL_IDENTIFIER) {
        return set_optional(&mut resource.external_id, name, path, values);
    }

    let column = mapping
        .column_for(&path.attribute)
        .filter(|c| c != IDENTIFIER && c != SCHEMAS)
        .ok_or_else(|| unsupported_path(path))?;

    match name {
        OperationName::Remove => {
            resource.attributes.remove(&column);
        }
        OperationName::Add | OperationName::Replace => {
            resource
                .attributes
                .insert(column, string_value(values, path)?);
        }
    }
    Ok(())
}
