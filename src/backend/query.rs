//! Conjunctive equality predicates over rows

use lazy_static::lazy_static;
use regex::Regex;

use super::Columns;

lazy_static! {
    static ref DIGITS: Regex = Regex::new(r"^[0-9]+$").unwrap();
    static ref BOOLEAN: Regex = Regex::new(r"^(?i:true|false)$").unwrap();
}

/// A comparison value, typed the way the query text would carry it
///
/// Boolean literals and all-digit strings are unquoted; anything else is a
/// quoted string literal. Digits only change how the literal is rendered:
/// they still match the stored text exactly, so `42` does not match `042`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Boolean(bool),
    Number(String),
    Text(String),
}

impl QueryValue {
    pub fn parse(raw: &str) -> Self {
        if BOOLEAN.is_match(raw) {
            QueryValue::Boolean(raw.eq_ignore_ascii_case("true"))
        } else if DIGITS.is_match(raw) {
            QueryValue::Number(raw.to_string())
        } else {
            QueryValue::Text(raw.to_string())
        }
    }

    pub fn matches(&self, cell: &str) -> bool {
        match self {
            QueryValue::Boolean(expected) => {
                BOOLEAN.is_match(cell) && cell.eq_ignore_ascii_case("true") == *expected
            }
            QueryValue::Number(digits) | QueryValue::Text(digits) => cell == digits,
        }
    }

    /// The literal as it appears in the rendered query text
    pub fn literal(&self) -> String {
        match self {
            QueryValue::Boolean(true) => "True".to_string(),
            QueryValue::Boolean(false) => "False".to_string(),
            QueryValue::Number(digits) => digits.clone(),
            QueryValue::Text(text) => format!("'{}'", text.replace('\'', "''")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RowPredicate {
    conditions: Vec<(String, QueryValue)>,
}

impl RowPredicate {
    pub fn from_columns(columns: &Columns) -> Self {
        Self {
            conditions: columns
                .iter()
                .map(|(name, raw)| (name.clone(), QueryValue::parse(raw)))
                .collect(),
        }
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.conditions.iter().map(|(name, _)| name.as_str())
    }

    /// Test every condition; `cell` looks a column's value up in the candidate row
    pub fn matches<'a, F>(&self, cell: F) -> bool
    where
        F: Fn(&str) -> &'a str,
    {
        self.conditions
            .iter()
            .all(|(name, value)| value.matches(cell(name)))
    }

    /// Render the equivalent tabular-driver query for diagnostics
    pub fn to_sql(&self, table: &str) -> String {
        let mut sql = format!("SELECT * FROM [{}]", table);
        if !self.conditions.is_empty() {
            let clauses: Vec<String> = self
                .conditions
                .iter()
                .map(|(name, value)| format!("[{}] = {}", name, value.literal()))
                .collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_classification() {
        assert_eq!(QueryValue::parse("TRUE"), QueryValue::Boolean(true));
        assert_eq!(QueryValue::parse("false"), QueryValue::Boolean(false));
        assert_eq!(QueryValue::parse("0042"), QueryValue::Number("0042".to_string()));
        assert_eq!(QueryValue::parse("42a"), QueryValue::Text("42a".to_string()));
        assert_eq!(QueryValue::parse(""), QueryValue::Text(String::new()));
    }

    #[test]
    fn test_value_matching() {
        assert!(QueryValue::parse("true").matches("True"));
        assert!(!QueryValue::parse("true").matches("false"));
        assert!(QueryValue::parse("42").matches("42"));
        assert!(!QueryValue::parse("42").matches("042"));
        assert!(!QueryValue::parse("007").matches("7"));
        assert!(!QueryValue::parse("42").matches("42.0"));
        assert!(QueryValue::parse("Doe, Jane").matches("Doe, Jane"));
        assert!(!QueryValue::parse("doe").matches("Doe"));
    }

    #[test]
    fn test_conjunction_and_rendering() {
        let mut columns = Columns::new();
        columns.insert("active".to_string(), "true".to_string());
        columns.insert("userName".to_string(), "o'neil".to_string());
        let predicate = RowPredicate::from_columns(&columns);

        assert_eq!(
            predicate.to_sql("Resources.csv"),
            "SELECT * FROM [Resources.csv] WHERE [active] = True AND [userName] = 'o''neil'"
        );
        assert!(predicate.matches(|name| if name == "active" { "true" } else { "o'neil" }));
        assert!(!predicate.matches(|name| if name == "active" { "false" } else { "o'neil" }));
    }

    #[test]
    fn test_empty_predicate_matches_everything() {
        let predicate = RowPredicate::from_columns(&Columns::new());
        assert!(predicate.matches(|_| ""));
        assert_eq!(predicate.to_sql("R.csv"), "SELECT * FROM [R.csv]");
    }
}
