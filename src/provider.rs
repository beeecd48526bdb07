use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::backend::query::QueryValue;
use crate::backend::{Columns, Row, RowStore, RowStoreFactory};
use crate::config::StoreConfig;
use crate::error::{require_value, AppError, AppResult};
use crate::mapping::{MappingRegistry, ResourceKind, ResourceMapping};
use crate::membership::{is_membership_row, MembershipRows};
use crate::models::{
    ComparisonOperator, Filter, Member, PatchRequest, QueryParameters, Resource,
    ResourceIdentifier, RetrievalParameters,
};
use crate::monitor::{Monitor, MonitorExt};
use crate::patch::{MembershipChange, PatchEngine};
use crate::schema::attributes::{FAMILY_NAME, GIVEN_NAME, IDENTIFIER, MEMBERS, NAME, SCHEMAS};
use crate::schema::unqualified_path;

/// The contract the SCIM protocol layer calls into
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create(&self, resource: Resource, correlation_id: &str) -> AppResult<Resource>;

    async fn retrieve(
        &self,
        parameters: &RetrievalParameters,
        correlation_id: &str,
    ) -> AppResult<Option<Resource>>;

    async fn query(
        &self,
        parameters: &QueryParameters,
        correlation_id: &str,
    ) -> AppResult<Vec<Resource>>;

    async fn update(&self, patch: &PatchRequest, correlation_id: &str) -> AppResult<()>;

    async fn delete(&self, identifier: &ResourceIdentifier, correlation_id: &str)
        -> AppResult<()>;
}

/// Provider backed by a row store
///
/// Holds no state of its own beyond the store, the mapping registry and the
/// monitor. Deleting a resource also removes the membership rows that
/// reference it.
pub struct FileProvider {
    store: Arc<dyn RowStore>,
    registry: MappingRegistry,
    monitor: Arc<dyn Monitor>,
}

impl FileProvider {
    pub fn new(
        store: Arc<dyn RowStore>,
        registry: MappingRegistry,
        monitor: Arc<dyn Monitor>,
    ) -> Self {
        Self {
            store,
            registry,
            monitor,
        }
    }

    /// Open the comma-delimited store described by the configuration
    pub async fn open(config: &StoreConfig, monitor: Arc<dyn Monitor>) -> AppResult<Self> {
        let store = RowStoreFactory::open(config, monitor.clone()).await?;
        Ok(Self::new(store, MappingRegistry::from_config(config), monitor))
    }

    pub fn store(&self) -> &Arc<dyn RowStore> {
        &self.store
    }

    fn memberships(&self) -> MembershipRows<'_> {
        MembershipRows::new(self.store.as_ref())
    }

    /// Fail before any I/O when inline members are requested
    fn check_requested(
        mapping: &dyn ResourceMapping,
        requested: &[String],
    ) -> AppResult<()> {
        if mapping.kind() == ResourceKind::Group
            && requested.iter().any(|p| mapping.column_for(p).as_deref() == Some(MEMBERS))
        {
            return Err(AppError::NotSupported(
                "Retrieving members of a group is not supported".to_string(),
            ));
        }
        Ok(())
    }

    /// Keep only requested columns (always with the schema tag) minus excluded ones
    fn reduce(
        mapping: &dyn ResourceMapping,
        row: Row,
        requested: &[String],
        excluded: &[String],
    ) -> Row {
        let mut row = row.reduced();
        if !requested.is_empty() {
            let keep: BTreeSet<String> = requested
                .iter()
                .flat_map(|p| Self::columns_for(mapping, p))
                .chain(std::iter::once(SCHEMAS.to_string()))
                .collect();
            row.columns.retain(|name, _| keep.contains(name));
        }
        for column in excluded.iter().flat_map(|p| Self::columns_for(mapping, p)) {
            if column != SCHEMAS {
                row.columns.remove(&column);
            }
        }
        row
    }

    /// Columns behind an attribute path; the complex `name` spans two
    fn columns_for(mapping: &dyn ResourceMapping, path: &str) -> Vec<String> {
        if mapping.kind() == ResourceKind::User
            && unqualified_path(path.trim()).eq_ignore_ascii_case(NAME)
        {
            return vec![GIVEN_NAME.to_string(), FAMILY_NAME.to_string()];
        }
        mapping.column_for(path).into_iter().collect()
    }

    /// A resource row of the mapping's kind, or `None`
    async fn read_resource_row(
        &self,
        mapping: &dyn ResourceMapping,
        identifier: &str,
    ) -> AppResult<Option<Row>> {
        Ok(self
            .store
            .read_row(identifier)
            .await?
            .filter(|row| mapping.owns(row) && !is_membership_row(row)))
    }

    fn to_resources(
        mapping: &dyn ResourceMapping,
        rows: Vec<Row>,
        requested: &[String],
        excluded: &[String],
    ) -> AppResult<Vec<Resource>> {
        rows.into_iter()
            .filter(|row| mapping.owns(row) && !is_membership_row(row))
            .map(|row| mapping.create_resource(&Self::reduce(mapping, row, requested, excluded)))
            .collect()
    }

    fn require_equality(filter: &Filter) -> AppResult<()> {
        if filter.comparison_operator != ComparisonOperator::Equals {
            return Err(AppError::NotSupported(format!(
                "Comparison operator {:?} on {} is not supported",
                filter.comparison_operator, filter.attribute_path
            )));
        }
        Ok(())
    }

    fn filter_column(mapping: &dyn ResourceMapping, filter: &Filter) -> AppResult<String> {
        Self::require_equality(filter)?;
        mapping.column_for(&filter.attribute_path).ok_or_else(|| {
            AppError::NotSupported(format!(
                "Filtering on {} is not supported for {}",
                filter.attribute_path,
                mapping.schema()
            ))
        })
    }

    async fn query_simple(
        &self,
        mapping: &dyn ResourceMapping,
        filter: &Filter,
        parameters: &QueryParameters,
    ) -> AppResult<Vec<Resource>> {
        let column = Self::filter_column(mapping, filter)?;
        let requested = &parameters.requested_attribute_paths;
        let excluded = &parameters.excluded_attribute_paths;

        let rows = if column == IDENTIFIER {
            self.read_resource_row(mapping, &filter.comparison_value)
                .await?
                .into_iter()
                .collect()
        } else if column == MEMBERS {
            // Groups containing the member, resolved through the membership rows
            let mut rows = Vec::new();
            for group in self.memberships().groups_of(&filter.comparison_value).await? {
                rows.extend(self.read_resource_row(mapping, &group).await?);
            }
            rows
        } else {
            let mut columns = Columns::new();
            columns.insert(SCHEMAS.to_string(), mapping.schema().to_string());
            columns.insert(column, filter.comparison_value.clone());
            self.store.query(&columns).await?
        };

        Self::to_resources(mapping, rows, requested, excluded)
    }

    /// `id eq X and <reference> eq V`: does resource X carry reference V
    async fn query_reference(
        &self,
        mapping: &dyn ResourceMapping,
        primary: &Filter,
        reference: &Filter,
        parameters: &QueryParameters,
    ) -> AppResult<Vec<Resource>> {
        if Self::filter_column(mapping, primary)? != IDENTIFIER {
            return Err(AppError::NotSupported(format!(
                "Reference queries must filter on {}, not {}",
                IDENTIFIER, primary.attribute_path
            )));
        }
        if reference.additional_filter.is_some() {
            return Err(AppError::NotSupported(
                "Filters nested more than two levels are not supported".to_string(),
            ));
        }

        let column = Self::filter_column(mapping, reference)?;
        if column == IDENTIFIER || column == SCHEMAS {
            return Err(AppError::NotSupported(format!(
                "{} is not a reference attribute",
                reference.attribute_path
            )));
        }

        let identifier = &primary.comparison_value;
        let row = if column == MEMBERS {
            if !self
                .memberships()
                .contains(identifier, &reference.comparison_value)
                .await?
            {
                return Ok(Vec::new());
            }
            self.read_resource_row(mapping, identifier).await?
        } else {
            let expected = QueryValue::parse(&reference.comparison_value);
            self.read_resource_row(mapping, identifier)
                .await?
                .filter(|row| row.value(&column).is_some_and(|v| expected.matches(v)))
        };

        Self::to_resources(
            mapping,
            row.into_iter().collect(),
            &parameters.requested_attribute_paths,
            &parameters.excluded_attribute_paths,
        )
    }

    async fn apply_membership(
        &self,
        group: &str,
        changes: &[MembershipChange],
        correlation_id: &str,
    ) -> AppResult<()> {
        let memberships = self.memberships();
        for change in changes {
            match change {
                MembershipChange::Add(member) => {
                    if !memberships.add(group, member).await? {
                        self.monitor.information(
                            Some(correlation_id),
                            format!("{} is already a member of {}", member, group),
                        );
                    }
                }
                MembershipChange::Remove(member) => {
                    memberships.remove(group, member).await?;
                }
            }
        }
        Ok(())
    }

    /// Log a failed request against its correlation identifier and pass the error on
    fn report(&self, correlation_id: &str, error: AppError) -> AppError {
        let correlation_id = Some(correlation_id).filter(|c| !c.is_empty());
        if error.is_bad_request() {
            self.monitor.warning(correlation_id, error.to_string());
        } else {
            self.monitor.error(correlation_id, error.to_string());
        }
        error
    }

    fn validate_identifier(identifier: &ResourceIdentifier) -> AppResult<()> {
        require_value(&identifier.schema_identifier, "Schema identifier")?;
        require_value(&identifier.identifier, "Resource identifier")
    }

    async fn handle_create(
        &self,
        mut resource: Resource,
        correlation_id: &str,
    ) -> AppResult<Resource> {
        require_value(correlation_id, "Correlation identifier")?;
        let mapping = self.registry.resolve(resource.schema())?;
        mapping.validate(&resource)?;

        resource.set_identifier(None);
        let columns = mapping.create_columns(&resource)?;
        let row = self.store.insert_row(columns).await?;
        let mut created = mapping.create_resource(&row.reduced())?;

        if let (Resource::Group(input), Resource::Group(output)) = (&resource, &mut created) {
            if let Some(members) = input.members.as_ref().filter(|m| !m.is_empty()) {
                let group = output.id.clone().ok_or_else(|| {
                    AppError::Internal("Inserted group row has no key".to_string())
                })?;
                let memberships = self.memberships();
                let mut stored: Vec<Member> = Vec::new();
                for member in members {
                    memberships.add(&group, &member.value).await?;
                    if !stored.iter().any(|m| m.value == member.value) {
                        stored.push(member.clone());
                    }
                }
                output.members = Some(stored);
            }
        }

        self.monitor.information(
            Some(correlation_id),
            format!(
                "Created {} {}",
                mapping.schema(),
                created.identifier().unwrap_or_default()
            ),
        );
        Ok(created)
    }

    async fn handle_retrieve(
        &self,
        parameters: &RetrievalParameters,
        correlation_id: &str,
    ) -> AppResult<Option<Resource>> {
        require_value(correlation_id, "Correlation identifier")?;
        Self::validate_identifier(&parameters.resource_identifier)?;
        let mapping = self
            .registry
            .resolve(&parameters.resource_identifier.schema_identifier)?;
        Self::check_requested(mapping.as_ref(), &parameters.requested_attribute_paths)?;

        let row = match self
            .read_resource_row(mapping.as_ref(), &parameters.resource_identifier.identifier)
            .await?
        {
            Some(row) => row,
            None => return Ok(None),
        };

        let row = Self::reduce(
            mapping.as_ref(),
            row,
            &parameters.requested_attribute_paths,
            &parameters.excluded_attribute_paths,
        );
        Ok(Some(mapping.create_resource(&row)?))
    }

    async fn handle_query(
        &self,
        parameters: &QueryParameters,
        correlation_id: &str,
    ) -> AppResult<Vec<Resource>> {
        require_value(correlation_id, "Correlation identifier")?;
        require_value(&parameters.schema_identifier, "Schema identifier")?;
        let mapping = self.registry.resolve(&parameters.schema_identifier)?;
        Self::check_requested(mapping.as_ref(), &parameters.requested_attribute_paths)?;

        let filter = match parameters.alternate_filters.as_slice() {
            [] => return Err(AppError::BadRequest("A filter is required".to_string())),
            [filter] => filter,
            _ => {
                return Err(AppError::NotSupported(
                    "Only a single filter is supported".to_string(),
                ))
            }
        };
        require_value(&filter.attribute_path, "Filter attribute")?;

        match filter.additional_filter.as_deref() {
            None => self.query_simple(mapping.as_ref(), filter, parameters).await,
            Some(reference) => {
                self.query_reference(mapping.as_ref(), filter, reference, parameters)
                    .await
            }
        }
    }

    async fn handle_update(&self, patch: &PatchRequest, correlation_id: &str) -> AppResult<()> {
        require_value(correlation_id, "Correlation identifier")?;
        Self::validate_identifier(&patch.resource_identifier)?;
        let mapping = self
            .registry
            .resolve(&patch.resource_identifier.schema_identifier)?;

        let operations = match patch.operations.as_deref() {
            Some(operations) if !operations.is_empty() => operations,
            _ => return Ok(()),
        };

        let identifier = &patch.resource_identifier.identifier;
        let row = match self.read_resource_row(mapping.as_ref(), identifier).await? {
            Some(row) => row.reduced(),
            None => {
                self.monitor.warning(
                    Some(correlation_id),
                    format!(
                        "No {} resource {} to update",
                        mapping.schema(),
                        identifier
                    ),
                );
                return Ok(());
            }
        };

        let resource = mapping.create_resource(&row)?;
        let outcome = PatchEngine::apply(mapping.as_ref(), resource, Some(operations))?;
        let columns = mapping.create_columns(&outcome.resource)?;

        if columns != row.columns {
            self.store.replace_row(&Row::new(row.key.clone(), columns)).await?;
        }
        if mapping.kind() == ResourceKind::Group {
            self.apply_membership(&row.key, &outcome.membership, correlation_id)
                .await?;
        }

        self.monitor.information(
            Some(correlation_id),
            format!("Updated {} {}", mapping.schema(), identifier),
        );
        Ok(())
    }

    async fn handle_delete(
        &self,
        identifier: &ResourceIdentifier,
        correlation_id: &str,
    ) -> AppResult<()> {
        require_value(correlation_id, "Correlation identifier")?;
        Self::validate_identifier(identifier)?;
        let mapping = self.registry.resolve(&identifier.schema_identifier)?;

        if self
            .read_resource_row(mapping.as_ref(), &identifier.identifier)
            .await?
            .is_none()
        {
            self.monitor.warning(
                Some(correlation_id),
                format!(
                    "No {} resource {} to delete",
                    mapping.schema(),
                    identifier.identifier
                ),
            );
            return Ok(());
        }

        self.store.remove_row(&identifier.identifier).await?;

        let removed = match mapping.kind() {
            ResourceKind::Group => self.memberships().remove_group(&identifier.identifier).await?,
            ResourceKind::User => self.memberships().remove_member(&identifier.identifier).await?,
            ResourceKind::Dynamic => 0,
        };
        if removed > 0 {
            self.monitor.information(
                Some(correlation_id),
                format!(
                    "Removed {} membership row(s) referencing {}",
                    removed, identifier.identifier
                ),
            );
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for FileProvider {
    async fn create(&self, resource: Resource, correlation_id: &str) -> AppResult<Resource> {
        self.handle_create(resource, correlation_id)
            .await
            .map_err(|e| self.report(correlation_id, e))
    }

    async fn retrieve(
        &self,
        parameters: &RetrievalParameters,
        correlation_id: &str,
    ) -> AppResult<Option<Resource>> {
        self.handle_retrieve(parameters, correlation_id)
            .await
            .map_err(|e| self.report(correlation_id, e))
    }

    async fn query(
        &self,
        parameters: &QueryParameters,
        correlation_id: &str,
    ) -> AppResult<Vec<Resource>> {
        self.handle_query(parameters, correlation_id)
            .await
            .map_err(|e| self.report(correlation_id, e))
    }

    async fn update(&self, patch: &PatchRequest, correlation_id: &str) -> AppResult<()> {
        self.handle_update(patch, correlation_id)
            .await
            .map_err(|e| self.report(correlation_id, e))
    }

    async fn delete(
        &self,
        identifier: &ResourceIdentifier,
        correlation_id: &str,
    ) -> AppResult<()> {
        self.handle_delete(identifier, correlation_id)
            .await
            .map_err(|e| self.report(correlation_id, e))
    }
}
