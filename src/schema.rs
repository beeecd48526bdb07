//! Schema identifiers and the canonical attribute names used as columns

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const ENTERPRISE_USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User";

pub mod attributes {
    pub const IDENTIFIER: &str = "id";
    pub const SCHEMAS: &str = "schemas";
    pub const MEMBERS: &str = "members";
    pub const EXTERNAL_IDENTIFIER: &str = "externalId";

    pub const USER_NAME: &str = "userName";
    pub const ACTIVE: &str = "active";
    pub const DISPLAY_NAME: &str = "displayName";
    pub const TITLE: &str = "title";
    pub const PREFERRED_LANGUAGE: &str = "preferredLanguage";
    pub const GIVEN_NAME: &str = "givenName";
    pub const FAMILY_NAME: &str = "familyName";
    pub const EMAILS: &str = "emails";
    pub const ADDRESSES: &str = "addresses";
    pub const PHONE_NUMBERS: &str = "phoneNumbers";

    pub const DEPARTMENT: &str = "department";
    pub const EMPLOYEE_NUMBER: &str = "employeeNumber";
    pub const MANAGER: &str = "manager";

    pub const NAME: &str = "name";
    pub const VALUE: &str = "value";
    pub const TYPE: &str = "type";
}

use attributes::*;

/// Columns shared by every row kind, in header order
pub const COMMON_COLUMNS: &[&str] = &[IDENTIFIER, SCHEMAS, MEMBERS, EXTERNAL_IDENTIFIER];

/// Columns a User row may populate besides the common ones
pub const USER_COLUMNS: &[&str] = &[
    USER_NAME,
    ACTIVE,
    DISPLAY_NAME,
    TITLE,
    PREFERRED_LANGUAGE,
    GIVEN_NAME,
    FAMILY_NAME,
    EMAILS,
    ADDRESSES,
    PHONE_NUMBERS,
    DEPARTMENT,
    EMPLOYEE_NUMBER,
    MANAGER,
];

pub const GROUP_COLUMNS: &[&str] = &[DISPLAY_NAME];

/// Canonical column names for the store header, deduplicated in declaration order
pub fn canonical_columns() -> Vec<String> {
    let mut columns: Vec<String> = Vec::new();
    for name in COMMON_COLUMNS
        .iter()
        .chain(USER_COLUMNS.iter())
        .chain(GROUP_COLUMNS.iter())
    {
        if !columns.iter().any(|c| c == name) {
            columns.push(name.to_string());
        }
    }
    columns
}

/// Strip a schema URN qualifier from an attribute path
///
/// `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager` becomes
/// `manager`; unqualified paths are returned as-is.
pub fn unqualified_path(path: &str) -> &str {
    if path.starts_with("urn:") {
        if let Some(last_colon) = path.rfind(':') {
            return &path[last_colon + 1..];
        }
    }
    path
}

/// Resolve a (possibly dotted or schema-qualified) attribute path to its column
///
/// Sub-attributes of a multi-valued family resolve to the family's column
/// (`emails.value` lives in `emails`). `name.givenName` and `name.familyName`
/// map onto their flattened columns.
pub fn column_for_path(path: &str) -> Option<&'static str> {
    let path = unqualified_path(path.trim());
    let (head, tail) = match path.split_once('.') {
        Some((head, tail)) => (head, Some(tail)),
        None => (path, None),
    };

    if head.eq_ignore_ascii_case(NAME) {
        return match tail {
            Some(t) if t.eq_ignore_ascii_case(GIVEN_NAME) => Some(GIVEN_NAME),
            Some(t) if t.eq_ignore_ascii_case(FAMILY_NAME) => Some(FAMILY_NAME),
            _ => None,
        };
    }

    COMMON_COLUMNS
        .iter()
        .chain(USER_COLUMNS.iter())
        .chain(GROUP_COLUMNS.iter())
        .find(|c| c.eq_ignore_ascii_case(head))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_columns_are_unique() {
        let columns = canonical_columns();
        let mut sorted = columns.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(columns.len(), sorted.len());
        assert_eq!(columns[0], IDENTIFIER);
        assert!(columns.contains(&DISPLAY_NAME.to_string()));
    }

    #[test]
    fn test_column_for_path() {
        assert_eq!(column_for_path("userName"), Some(USER_NAME));
        assert_eq!(column_for_path("USERNAME"), Some(USER_NAME));
        assert_eq!(column_for_path("name.givenName"), Some(GIVEN_NAME));
        assert_eq!(column_for_path("emails.value"), Some(EMAILS));
        assert_eq!(
            column_for_path("urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager"),
            Some(MANAGER)
        );
        assert_eq!(column_for_path("name"), None);
        assert_eq!(column_for_path("nickName"), None);
    }
}
