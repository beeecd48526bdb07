use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::schema::{ENTERPRISE_USER_SCHEMA, GROUP_SCHEMA, USER_SCHEMA};

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Name {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Email {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct PhoneNumber {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub street_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locality: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Manager {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Attributes of the enterprise User extension
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EnterpriseExtension {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<Manager>,
}

impl EnterpriseExtension {
    pub fn is_empty(&self) -> bool {
        self.department.is_none() && self.employee_number.is_none() && self.manager.is_none()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub user_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<Name>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emails: Option<Vec<Email>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_numbers: Option<Vec<PhoneNumber>>,
    #[serde(
        rename = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User",
        skip_serializing_if = "Option::is_none"
    )]
    pub enterprise: Option<EnterpriseExtension>,
}

impl User {
    pub fn new(user_name: impl Into<String>) -> Self {
        Self {
            user_name: user_name.into(),
            ..Default::default()
        }
    }

    pub fn schemas(&self) -> Vec<String> {
        let mut schemas = vec![USER_SCHEMA.to_string()];
        if self.enterprise.as_ref().is_some_and(|e| !e.is_empty()) {
            schemas.push(ENTERPRISE_USER_SCHEMA.to_string());
        }
        schemas
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Member {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Member {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            display: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members: Option<Vec<Member>>,
}

impl Group {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            ..Default::default()
        }
    }
}

/// A resource of a configured extension schema whose attributes are plain strings
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DynamicResource {
    pub schema: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, String>,
}

impl DynamicResource {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Resource {
    User(User),
    Group(Group),
    Dynamic(DynamicResource),
}

impl Resource {
    pub fn identifier(&self) -> Option<&str> {
        match self {
            Resource::User(u) => u.id.as_deref(),
            Resource::Group(g) => g.id.as_deref(),
            Resource::Dynamic(d) => d.id.as_deref(),
        }
    }

    pub fn set_identifier(&mut self, identifier: Option<String>) {
        match self {
            Resource::User(u) => u.id = identifier,
            Resource::Group(g) => g.id = identifier,
            Resource::Dynamic(d) => d.id = identifier,
        }
    }

    pub fn external_identifier(&self) -> Option<&str> {
        match self {
            Resource::User(u) => u.external_id.as_deref(),
            Resource::Group(g) => g.external_id.as_deref(),
            Resource::Dynamic(d) => d.external_id.as_deref(),
        }
    }

    /// The schema tag stamped on the resource's row
    pub fn schema(&self) -> &str {
        match self {
            Resource::User(_) => USER_SCHEMA,
            Resource::Group(_) => GROUP_SCHEMA,
            Resource::Dynamic(d) => &d.schema,
        }
    }

    pub fn as_user(&self) -> Option<&User> {
        match self {
            Resource::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn as_group(&self) -> Option<&Group> {
        match self {
            Resource::Group(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_dynamic(&self) -> Option<&DynamicResource> {
        match self {
            Resource::Dynamic(d) => Some(d),
            _ => None,
        }
    }
}

impl From<User> for Resource {
    fn from(user: User) -> Self {
        Resource::User(user)
    }
}

impl From<Group> for Resource {
    fn from(group: Group) -> Self {
        Resource::Group(group)
    }
}

impl From<DynamicResource> for Resource {
    fn from(resource: DynamicResource) -> Self {
        Resource::Dynamic(resource)
    }
}

/// Names one stored resource
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub schema_identifier: String,
    pub identifier: String,
}

impl ResourceIdentifier {
    pub fn new(schema_identifier: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            schema_identifier: schema_identifier.into(),
            identifier: identifier.into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalParameters {
    pub resource_identifier: ResourceIdentifier,
    #[serde(default)]
    pub requested_attribute_paths: Vec<String>,
    #[serde(default)]
    pub excluded_attribute_paths: Vec<String>,
}

impl RetrievalParameters {
    pub fn new(schema_identifier: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            resource_identifier: ResourceIdentifier::new(schema_identifier, identifier),
            requested_attribute_paths: Vec::new(),
            excluded_attribute_paths: Vec::new(),
        }
    }

    pub fn requesting(mut self, paths: &[&str]) -> Self {
        self.requested_attribute_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn excluding(mut self, paths: &[&str]) -> Self {
        self.excluded_attribute_paths = paths.iter().map(|p| p.to_string()).collect();
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    Contains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    Present,
}

/// An already-parsed filter expression
///
/// A filter with an `additional_filter` is the conjunction of both. Only
/// equality is evaluated by the file provider.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub attribute_path: String,
    pub comparison_operator: ComparisonOperator,
    pub comparison_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_filter: Option<Box<Filter>>,
}

impl Filter {
    pub fn equals(attribute_path: impl Into<String>, comparison_value: impl Into<String>) -> Self {
        Self {
            attribute_path: attribute_path.into(),
            comparison_operator: ComparisonOperator::Equals,
            comparison_value: comparison_value.into(),
            additional_filter: None,
        }
    }

    pub fn and(mut self, additional: Filter) -> Self {
        self.additional_filter = Some(Box::new(additional));
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryParameters {
    pub schema_identifier: String,
    #[serde(default)]
    pub alternate_filters: Vec<Filter>,
    #[serde(default)]
    pub requested_attribute_paths: Vec<String>,
    #[serde(default)]
    pub excluded_attribute_paths: Vec<String>,
}

impl QueryParameters {
    pub fn new(schema_identifier: impl Into<String>, filter: Filter) -> Self {
        Self {
            schema_identifier: schema_identifier.into(),
            alternate_filters: vec![filter],
            requested_attribute_paths: Vec::new(),
            excluded_attribute_paths: Vec::new(),
        }
    }
}

/// A pre-parsed PATCH path such as `emails[type eq "work"].value`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AttributePath {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub attribute: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_filter: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_attribute: Option<String>,
}

impl AttributePath {
    pub fn attribute(attribute: impl Into<String>) -> Self {
        Self {
            schema: None,
            attribute: attribute.into(),
            value_filter: None,
            sub_attribute: None,
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.value_filter = Some(filter);
        self
    }

    pub fn with_sub_attribute(mut self, sub_attribute: impl Into<String>) -> Self {
        self.sub_attribute = Some(sub_attribute.into());
        self
    }
}

impl std::fmt::Display for AttributePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(schema) = &self.schema {
            write!(f, "{}:", schema)?;
        }
        write!(f, "{}", self.attribute)?;
        if let Some(filter) = &self.value_filter {
            write!(f, "[{} eq \"{}\"]", filter.attribute_path, filter.comparison_value)?;
        }
        if let Some(sub) = &self.sub_attribute {
            write!(f, ".{}", sub)?;
        }
        Ok(())
    }
}

/// One add/replace/remove instruction of a PATCH request
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PatchOperation {
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<AttributePath>,
    #[serde(default)]
    pub value: Vec<Value>,
}

impl PatchOperation {
    pub fn new(op: &str, path: AttributePath, value: Vec<Value>) -> Self {
        Self {
            op: op.to_string(),
            path: Some(path),
            value,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PatchRequest {
    pub resource_identifier: ResourceIdentifier,
    #[serde(rename = "Operations", default)]
    pub operations: Option<Vec<PatchOperation>>,
}

impl PatchRequest {
    pub fn new(resource_identifier: ResourceIdentifier, operations: Vec<PatchOperation>) -> Self {
        Self {
            resource_identifier,
            operations: Some(operations),
        }
    }
}
