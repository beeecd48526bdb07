//! Provider operations end to end over a temporary data file

use file_provisioning::models::{
    AttributePath, ComparisonOperator, DynamicResource, Email, EnterpriseExtension, Filter, Group,
    Manager, Member, Name, PatchOperation, PatchRequest, QueryParameters, Resource,
    ResourceIdentifier, RetrievalParameters, User,
};
use file_provisioning::monitor::Severity;
use file_provisioning::provider::{FileProvider, Provider};
use file_provisioning::schema::{GROUP_SCHEMA, USER_SCHEMA};
use serde_json::json;

mod common;

use common::{CORRELATION_ID, DEVICE_SCHEMA};

fn full_user() -> User {
    let mut user = User::new("bjensen");
    user.external_id = Some("ext-1".to_string());
    user.active = Some(true);
    user.display_name = Some("Babs Jensen".to_string());
    user.title = Some("Tour Guide".to_string());
    user.preferred_language = Some("en-US".to_string());
    user.name = Some(Name {
        given_name: Some("Barbara".to_string()),
        family_name: Some("Jensen".to_string()),
    });
    user.emails = Some(vec![Email {
        value: Some("bjensen@example.com".to_string()),
        type_: Some("work".to_string()),
        primary: Some(true),
    }]);
    user.enterprise = Some(EnterpriseExtension {
        department: Some("Tours".to_string()),
        employee_number: Some("701984".to_string()),
        manager: Some(Manager {
            value: Some("m1".to_string()),
            display_name: None,
        }),
    });
    user
}

async fn create_user(provider: &FileProvider, user_name: &str) -> String {
    provider
        .create(Resource::User(User::new(user_name)), CORRELATION_ID)
        .await
        .unwrap()
        .identifier()
        .unwrap()
        .to_string()
}

async fn create_group(provider: &FileProvider, display_name: &str, members: &[&str]) -> String {
    let mut group = Group::new(display_name);
    if !members.is_empty() {
        group.members = Some(members.iter().map(|m| Member::new(*m)).collect());
    }
    provider
        .create(Resource::Group(group), CORRELATION_ID)
        .await
        .unwrap()
        .identifier()
        .unwrap()
        .to_string()
}

async fn patch(provider: &FileProvider, schema: &str, id: &str, operations: Vec<PatchOperation>) {
    let request = PatchRequest::new(ResourceIdentifier::new(schema, id), operations);
    provider.update(&request, CORRELATION_ID).await.unwrap();
}

fn member_op(op: &str, member: &str) -> PatchOperation {
    PatchOperation::new(op, AttributePath::attribute("members"), vec![json!({"value": member})])
}

async fn query_members(provider: &FileProvider, group: &str, member: &str) -> Vec<Resource> {
    let filter = Filter::equals("id", group).and(Filter::equals("members", member));
    provider
        .query(&QueryParameters::new(GROUP_SCHEMA, filter), CORRELATION_ID)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_then_retrieve_round_trip() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let user = full_user();

    let created = provider
        .create(Resource::User(user.clone()), CORRELATION_ID)
        .await
        .unwrap();
    let id = created.identifier().unwrap().to_string();

    let retrieved = provider
        .retrieve(&RetrievalParameters::new(USER_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap()
        .unwrap();

    let mut expected = user;
    expected.id = Some(id);
    assert_eq!(retrieved, Resource::User(expected));
    assert_eq!(created, retrieved);
}

#[tokio::test]
async fn test_create_ignores_supplied_identifier() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let mut user = User::new("bjensen");
    user.id = Some("chosen-by-client".to_string());

    let created = provider
        .create(Resource::User(user), CORRELATION_ID)
        .await
        .unwrap();

    assert_ne!(created.identifier(), Some("chosen-by-client"));
}

#[tokio::test]
async fn test_create_validates_required_attributes() {
    let (_dir, config, provider, _monitor) = common::setup_test_provider().await;

    let err = provider
        .create(Resource::User(User::new("")), CORRELATION_ID)
        .await
        .unwrap_err();
    assert!(err.is_bad_request());

    let err = provider
        .create(Resource::Group(Group::new(" ")), CORRELATION_ID)
        .await
        .unwrap_err();
    assert!(err.is_bad_request());

    assert_eq!(common::file_lines(&config.file_path()).len(), 1);
}

#[tokio::test]
async fn test_missing_correlation_identifier_is_rejected() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;

    let err = provider
        .create(Resource::User(User::new("bjensen")), "")
        .await
        .unwrap_err();
    assert!(err.is_bad_request());
}

#[tokio::test]
async fn test_unknown_schema_is_not_supported() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;

    let err = provider
        .retrieve(
            &RetrievalParameters::new("urn:example:schemas:Printer", "x"),
            CORRELATION_ID,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_retrieve_missing_resource_is_none() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;

    let found = provider
        .retrieve(&RetrievalParameters::new(USER_SCHEMA, "missing"), CORRELATION_ID)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_retrieve_honors_requested_and_excluded_attributes() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let id = provider
        .create(Resource::User(full_user()), CORRELATION_ID)
        .await
        .unwrap()
        .identifier()
        .unwrap()
        .to_string();

    let requested = provider
        .retrieve(
            &RetrievalParameters::new(USER_SCHEMA, &id).requesting(&["userName", "title"]),
            CORRELATION_ID,
        )
        .await
        .unwrap()
        .unwrap();
    let user = requested.as_user().unwrap();
    assert_eq!(user.user_name, "bjensen");
    assert_eq!(user.title.as_deref(), Some("Tour Guide"));
    assert!(user.emails.is_none());
    assert!(user.display_name.is_none());

    let excluded = provider
        .retrieve(
            &RetrievalParameters::new(USER_SCHEMA, &id).excluding(&["emails"]),
            CORRELATION_ID,
        )
        .await
        .unwrap()
        .unwrap();
    let user = excluded.as_user().unwrap();
    assert!(user.emails.is_none());
    assert_eq!(user.display_name.as_deref(), Some("Babs Jensen"));
}

#[tokio::test]
async fn test_requesting_group_members_is_not_supported() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let group = create_group(&provider, "Admins", &[]).await;

    let err = provider
        .retrieve(
            &RetrievalParameters::new(GROUP_SCHEMA, &group).requesting(&["members"]),
            CORRELATION_ID,
        )
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_query_by_attribute() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let id = create_user(&provider, "bjensen").await;
    create_user(&provider, "jsmith").await;

    let found = provider
        .query(
            &QueryParameters::new(USER_SCHEMA, Filter::equals("userName", "bjensen")),
            CORRELATION_ID,
        )
        .await
        .unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].identifier(), Some(id.as_str()));
}

#[tokio::test]
async fn test_query_filter_rules() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;

    let mut none = QueryParameters::new(USER_SCHEMA, Filter::equals("userName", "x"));
    none.alternate_filters.clear();
    let err = provider.query(&none, CORRELATION_ID).await.unwrap_err();
    assert!(err.is_bad_request());

    let mut two = QueryParameters::new(USER_SCHEMA, Filter::equals("userName", "x"));
    two.alternate_filters.push(Filter::equals("userName", "y"));
    let err = provider.query(&two, CORRELATION_ID).await.unwrap_err();
    assert!(err.is_not_supported());

    let mut contains = Filter::equals("userName", "bj");
    contains.comparison_operator = ComparisonOperator::Contains;
    let err = provider
        .query(&QueryParameters::new(USER_SCHEMA, contains), CORRELATION_ID)
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_reference_query_on_group_members() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let group = create_group(&provider, "Admins", &["u1"]).await;

    let hit = query_members(&provider, &group, "u1").await;
    assert_eq!(hit.len(), 1);
    assert_eq!(hit[0].identifier(), Some(group.as_str()));

    assert!(query_members(&provider, &group, "u2").await.is_empty());
}

#[tokio::test]
async fn test_reference_query_on_user_manager() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let id = provider
        .create(Resource::User(full_user()), CORRELATION_ID)
        .await
        .unwrap()
        .identifier()
        .unwrap()
        .to_string();

    let query = |manager: &str| {
        QueryParameters::new(
            USER_SCHEMA,
            Filter::equals("id", id.as_str()).and(Filter::equals(
                "urn:ietf:params:scim:schemas:extension:enterprise:2.0:User:manager",
                manager,
            )),
        )
    };

    assert_eq!(provider.query(&query("m1"), CORRELATION_ID).await.unwrap().len(), 1);
    assert!(provider.query(&query("m2"), CORRELATION_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reference_query_must_start_from_identifier() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;

    let filter = Filter::equals("displayName", "Admins").and(Filter::equals("members", "u1"));
    let err = provider
        .query(&QueryParameters::new(GROUP_SCHEMA, filter), CORRELATION_ID)
        .await
        .unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_groups_of_member_query() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let admins = create_group(&provider, "Admins", &["u1"]).await;
    let staff = create_group(&provider, "Staff", &["u1", "u2"]).await;
    create_group(&provider, "Guests", &["u2"]).await;

    let found = provider
        .query(
            &QueryParameters::new(GROUP_SCHEMA, Filter::equals("members", "u1")),
            CORRELATION_ID,
        )
        .await
        .unwrap();

    let mut ids: Vec<&str> = found.iter().filter_map(Resource::identifier).collect();
    ids.sort();
    let mut expected = vec![admins.as_str(), staff.as_str()];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_schema_mismatch_isolation() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let user = create_user(&provider, "bjensen").await;

    let retrieved = provider
        .retrieve(&RetrievalParameters::new(GROUP_SCHEMA, &user), CORRELATION_ID)
        .await
        .unwrap();
    assert!(retrieved.is_none());

    let queried = provider
        .query(
            &QueryParameters::new(GROUP_SCHEMA, Filter::equals("id", user.as_str())),
            CORRELATION_ID,
        )
        .await
        .unwrap();
    assert!(queried.is_empty());

    // Deleting through the wrong schema leaves the row alone
    provider
        .delete(&ResourceIdentifier::new(GROUP_SCHEMA, &user), CORRELATION_ID)
        .await
        .unwrap();
    assert!(provider
        .retrieve(&RetrievalParameters::new(USER_SCHEMA, &user), CORRELATION_ID)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_membership_rows_are_not_resources() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    create_group(&provider, "Admins", &["u1", "u2"]).await;

    let found = provider
        .query(
            &QueryParameters::new(GROUP_SCHEMA, Filter::equals("schemas", GROUP_SCHEMA)),
            CORRELATION_ID,
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found[0].as_group().unwrap().members.is_none());
}

#[tokio::test]
async fn test_membership_patch_is_idempotent() {
    let (_dir, config, provider, _monitor) = common::setup_test_provider().await;
    let group = create_group(&provider, "Admins", &[]).await;
    let baseline = common::file_lines(&config.file_path()).len();

    patch(&provider, GROUP_SCHEMA, &group, vec![member_op("add", "u1")]).await;
    patch(&provider, GROUP_SCHEMA, &group, vec![member_op("add", "u1")]).await;
    assert_eq!(common::file_lines(&config.file_path()).len(), baseline + 1);
    assert_eq!(query_members(&provider, &group, "u1").await.len(), 1);

    patch(&provider, GROUP_SCHEMA, &group, vec![member_op("remove", "u9")]).await;
    assert_eq!(common::file_lines(&config.file_path()).len(), baseline + 1);

    patch(&provider, GROUP_SCHEMA, &group, vec![member_op("remove", "u1")]).await;
    assert_eq!(common::file_lines(&config.file_path()).len(), baseline);
    assert!(query_members(&provider, &group, "u1").await.is_empty());
}

#[tokio::test]
async fn test_update_user_attributes() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let id = create_user(&provider, "bjensen").await;

    patch(
        &provider,
        USER_SCHEMA,
        &id,
        vec![
            PatchOperation::new("replace", AttributePath::attribute("title"), vec![json!("Guide")]),
            PatchOperation::new(
                "add",
                AttributePath::attribute("emails")
                    .with_filter(Filter::equals("type", "work"))
                    .with_sub_attribute("value"),
                vec![json!("bjensen@example.com")],
            ),
        ],
    )
    .await;

    let user = provider
        .retrieve(&RetrievalParameters::new(USER_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap()
        .unwrap();
    let user = user.as_user().unwrap();
    assert_eq!(user.title.as_deref(), Some("Guide"));
    assert_eq!(
        user.emails.as_ref().unwrap()[0].value.as_deref(),
        Some("bjensen@example.com")
    );
}

#[tokio::test]
async fn test_update_missing_resource_warns() {
    let (_dir, config, provider, monitor) = common::setup_test_provider().await;

    patch(
        &provider,
        USER_SCHEMA,
        "missing",
        vec![PatchOperation::new("replace", AttributePath::attribute("title"), vec![json!("A")])],
    )
    .await;

    assert_eq!(common::file_lines(&config.file_path()).len(), 1);
    let warnings = monitor.with_severity(Severity::Warning);
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].correlation_id.as_deref(), Some(CORRELATION_ID));
}

#[tokio::test]
async fn test_update_with_unsupported_operation_leaves_row() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let id = create_user(&provider, "bjensen").await;

    let request = PatchRequest::new(
        ResourceIdentifier::new(USER_SCHEMA, &id),
        vec![PatchOperation::new("move", AttributePath::attribute("title"), vec![json!("A")])],
    );
    let err = provider.update(&request, CORRELATION_ID).await.unwrap_err();
    assert!(err.is_not_supported());
}

#[tokio::test]
async fn test_rejected_update_keeps_resource() {
    let (_dir, config, provider, _monitor) = common::setup_test_provider().await;
    let mut user = User::new("bjensen");
    user.title = Some("Tour Guide".to_string());
    let id = provider
        .create(Resource::User(user), CORRELATION_ID)
        .await
        .unwrap()
        .identifier()
        .unwrap()
        .to_string();
    let before = common::file_lines(&config.file_path());

    let request = PatchRequest::new(
        ResourceIdentifier::new(USER_SCHEMA, &id),
        vec![PatchOperation::new("replace", AttributePath::attribute("title"), vec![json!("a\nb")])],
    );
    let err = provider.update(&request, CORRELATION_ID).await.unwrap_err();
    assert!(err.is_bad_request());

    assert_eq!(common::file_lines(&config.file_path()), before);
    let kept = provider
        .retrieve(&RetrievalParameters::new(USER_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(kept.as_user().unwrap().title.as_deref(), Some("Tour Guide"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_member_adds_store_one_edge() {
    let (_dir, config, provider, _monitor) = common::setup_test_provider().await;
    let provider = std::sync::Arc::new(provider);
    let group = create_group(&provider, "Admins", &[]).await;
    let baseline = common::file_lines(&config.file_path()).len();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let provider = provider.clone();
        let group = group.clone();
        handles.push(tokio::spawn(async move {
            patch(&provider, GROUP_SCHEMA, &group, vec![member_op("add", "u1")]).await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(common::file_lines(&config.file_path()).len(), baseline + 1);
    assert_eq!(query_members(&provider, &group, "u1").await.len(), 1);
}

#[tokio::test]
async fn test_delete_group_cascades_membership_rows() {
    let (_dir, config, provider, _monitor) = common::setup_test_provider().await;
    let group = create_group(&provider, "Admins", &["u1", "u2"]).await;
    assert_eq!(common::file_lines(&config.file_path()).len(), 4);

    provider
        .delete(&ResourceIdentifier::new(GROUP_SCHEMA, &group), CORRELATION_ID)
        .await
        .unwrap();

    assert_eq!(common::file_lines(&config.file_path()).len(), 1);
}

#[tokio::test]
async fn test_delete_user_cascades_membership_rows() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let user = create_user(&provider, "bjensen").await;
    let group = create_group(&provider, "Admins", &[user.as_str(), "u2"]).await;

    provider
        .delete(&ResourceIdentifier::new(USER_SCHEMA, &user), CORRELATION_ID)
        .await
        .unwrap();

    assert!(query_members(&provider, &group, &user).await.is_empty());
    assert_eq!(query_members(&provider, &group, "u2").await.len(), 1);
}

#[tokio::test]
async fn test_delete_missing_resource_is_noop() {
    let (_dir, _config, provider, monitor) = common::setup_test_provider().await;

    provider
        .delete(&ResourceIdentifier::new(USER_SCHEMA, "missing"), CORRELATION_ID)
        .await
        .unwrap();

    assert_eq!(monitor.with_severity(Severity::Warning).len(), 1);
}

#[tokio::test]
async fn test_dynamic_resource_lifecycle() {
    let (_dir, _config, provider, _monitor) = common::setup_test_provider().await;
    let device = DynamicResource::new(DEVICE_SCHEMA)
        .with_attribute("serialNumber", "SN-1")
        .with_attribute("owner", "u1");

    let created = provider
        .create(Resource::Dynamic(device), CORRELATION_ID)
        .await
        .unwrap();
    let id = created.identifier().unwrap().to_string();

    let found = provider
        .query(
            &QueryParameters::new(DEVICE_SCHEMA, Filter::equals("serialNumber", "SN-1")),
            CORRELATION_ID,
        )
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].identifier(), Some(id.as_str()));

    patch(
        &provider,
        DEVICE_SCHEMA,
        &id,
        vec![PatchOperation::new("replace", AttributePath::attribute("owner"), vec![json!("u2")])],
    )
    .await;
    let device = provider
        .retrieve(&RetrievalParameters::new(DEVICE_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        device.as_dynamic().unwrap().attributes.get("owner").map(String::as_str),
        Some("u2")
    );

    provider
        .delete(&ResourceIdentifier::new(DEVICE_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap();
    assert!(provider
        .retrieve(&RetrievalParameters::new(DEVICE_SCHEMA, &id), CORRELATION_ID)
        .await
        .unwrap()
        .is_none());
}
