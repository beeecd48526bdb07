//! Group membership edges stored as ordinary rows
//!
//! One row per (group, member) pair: `id` holds the group, `members` the
//! member and `schemas` the Group schema tag. Keeping edges as rows lets the
//! same equality query answer "which group contains member X".

use crate::backend::{Columns, Row, RowStore};
use crate::error::AppResult;
use crate::schema::attributes::{IDENTIFIER, MEMBERS, SCHEMAS};
use crate::schema::GROUP_SCHEMA;

/// True for rows that encode a membership edge rather than a resource
pub fn is_membership_row(row: &Row) -> bool {
    row.value(MEMBERS).is_some()
}

pub struct MembershipRows<'a> {
    store: &'a dyn RowStore,
}

impl<'a> MembershipRows<'a> {
    pub fn new(store: &'a dyn RowStore) -> Self {
        Self { store }
    }

    fn edge(group: Option<&str>, member: Option<&str>) -> Columns {
        let mut columns = Columns::new();
        columns.insert(SCHEMAS.to_string(), GROUP_SCHEMA.to_string());
        if let Some(group) = group {
            columns.insert(IDENTIFIER.to_string(), group.to_string());
        }
        if let Some(member) = member {
            columns.insert(MEMBERS.to_string(), member.to_string());
        }
        columns
    }

    async fn edges(&self, group: Option<&str>, member: Option<&str>) -> AppResult<Vec<Row>> {
        Ok(self
            .store
            .query(&Self::edge(group, member))
            .await?
            .into_iter()
            .filter(is_membership_row)
            .collect())
    }

    /// Insert the edge unless it already exists; returns whether a row was written
    pub async fn add(&self, group: &str, member: &str) -> AppResult<bool> {
        Ok(self
            .store
            .insert_row_if_absent(Self::edge(Some(group), Some(member)))
            .await?
            .is_some())
    }

    /// Remove every row for the edge; returns how many were found
    pub async fn remove(&self, group: &str, member: &str) -> AppResult<usize> {
        self.remove_rows(self.edges(Some(group), Some(member)).await?)
            .await
    }

    pub async fn contains(&self, group: &str, member: &str) -> AppResult<bool> {
        Ok(!self.edges(Some(group), Some(member)).await?.is_empty())
    }

    /// Member identifiers of a group
    pub async fn members_of(&self, group: &str) -> AppResult<Vec<String>> {
        Ok(self
            .edges(Some(group), None)
            .await?
            .iter()
            .filter_map(|row| row.value(MEMBERS).map(str::to_string))
            .collect())
    }

    /// Group identifiers that list the member
    pub async fn groups_of(&self, member: &str) -> AppResult<Vec<String>> {
        let mut groups: Vec<String> = self
            .edges(None, Some(member))
            .await?
            .iter()
            .filter_map(|row| row.value(IDENTIFIER).map(str::to_string))
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    pub async fn remove_group(&self, group: &str) -> AppResult<usize> {
        self.remove_rows(self.edges(Some(group), None).await?).await
    }

    pub async fn remove_member(&self, member: &str) -> AppResult<usize> {
        self.remove_rows(self.edges(None, Some(member)).await?).await
    }

    async fn remove_rows(&self, rows: Vec<Row>) -> AppResult<usize> {
        for row in &rows {
            self.store.remove_row(&row.key).await?;
        }
        Ok(rows.len())
    }
}
