use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::state::{check_enum, decode, encode, id_of, optional_set};
use super::{DataSourceHandler, ResourceHandler};
use crate::client::Client;
use crate::error::ProviderError;
use crate::model::{Group, GroupType, GroupUpdate, GroupsFilter};
use crate::schema::{Attribute, AttributeType, Diagnostic, Schema};

const ALL_ID: &str = "all-groups";

#[derive(Debug, Default, Serialize, Deserialize)]
struct GroupState {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    user_ids: Option<Vec<String>>,
    #[serde(rename = "type", default)]
    group_type: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

impl GroupState {
    fn from_group(group: Group, user_ids_configured: bool) -> Self {
        Self {
            id: Some(group.id),
            name: group.name,
            user_ids: optional_set(user_ids_configured, group.users),
            group_type: Some(group.group_type.as_str().to_string()),
            is_active: Some(group.is_active),
        }
    }
}

/// A group as data sources report it, without members.
#[derive(Debug, Serialize)]
struct GroupSummary {
    id: String,
    name: String,
    #[serde(rename = "type")]
    group_type: GroupType,
    is_active: bool,
}

impl From<Group> for GroupSummary {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            name: group.name,
            group_type: group.group_type,
            is_active: group.is_active,
        }
    }
}

pub(super) struct GroupResource;

#[async_trait::async_trait]
impl ResourceHandler for GroupResource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Groups are how users are authorized to access Resources.")
            .with_attribute("id", Attribute::computed_string().with_description("The ID of the Group"))
            .with_attribute("name", Attribute::required_string().with_description("The name of the group"))
            .with_attribute(
                "user_ids",
                Attribute::optional_string_set().with_description("List of User IDs that have permission to access the Group."),
            )
            .with_attribute(
                "type",
                Attribute::computed_string().with_description("The type of the Group"),
            )
            .with_attribute(
                "is_active",
                Attribute::computed_bool().with_description("Indicates if the Group is active"),
            )
    }

    async fn create(&self, client: &Client, planned: &Value) -> Result<Value, ProviderError> {
        let planned: GroupState = decode(planned)?;
        let user_ids = planned.user_ids.clone().unwrap_or_default();
        let group = client.create_group(&planned.name, &user_ids).await?;
        info!(id = %group.id, name = %group.name, "Group created");
        encode(&GroupState::from_group(group, planned.user_ids.is_some()))
    }

    async fn read(&self, client: &Client, state: &Value) -> Result<Value, ProviderError> {
        let current: GroupState = decode(state)?;
        let group = client.read_group(id_of(state)?).await?;
        encode(&GroupState::from_group(group, current.user_ids.is_some()))
    }

    async fn update(&self, client: &Client, prior: &Value, planned: &Value) -> Result<Value, ProviderError> {
        let id = id_of(prior)?.to_string();
        let prior: GroupState = decode(prior)?;
        let planned: GroupState = decode(planned)?;

        let group = client
            .update_group(&GroupUpdate {
                id,
                name: planned.name.clone(),
                old_users: prior.user_ids.unwrap_or_default(),
                new_users: planned.user_ids.clone().unwrap_or_default(),
            })
            .await?;
        encode(&GroupState::from_group(group, planned.user_ids.is_some()))
    }

    async fn delete(&self, client: &Client, state: &Value) -> Result<(), ProviderError> {
        let id = id_of(state)?;
        client.delete_group(id).await?;
        info!(id, "Group deleted");
        Ok(())
    }

    async fn import(&self, client: &Client, id: &str) -> Result<Value, ProviderError> {
        let group = client.read_group(id).await?;
        encode(&GroupState::from_group(group, false))
    }
}

pub(super) struct GroupDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for GroupDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Look up a single Group by id.")
            .with_attribute("id", Attribute::required_string().with_description("The ID of the Group"))
            .with_attribute("name", Attribute::computed_string())
            .with_attribute("type", Attribute::computed_string())
            .with_attribute("is_active", Attribute::computed_bool())
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let group = client.read_group(id_of(config)?).await?;
        encode(&GroupSummary::from(group))
    }
}

#[derive(Debug, Default, Deserialize)]
struct GroupsQuery {
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    group_type: Option<String>,
    #[serde(default)]
    is_active: Option<bool>,
}

pub(super) struct GroupsDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for GroupsDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Groups matching the given filters. Without filters every active Group is returned.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("name", Attribute::optional_string().with_description("Returns only Groups that exactly match this name."))
            .with_attribute(
                "type",
                Attribute::optional_string().with_description(format!(
                    "Returns only Groups of the specified type. Valid options: {}.",
                    GroupType::ALL.join(", ")
                )),
            )
            .with_attribute(
                "is_active",
                Attribute::optional_bool().with_description("Returns only Groups matching the specified state."),
            )
            .with_attribute(
                "groups",
                Attribute::computed_object_list([
                    ("id", AttributeType::String),
                    ("name", AttributeType::String),
                    ("type", AttributeType::String),
                    ("is_active", AttributeType::Bool),
                ])
                .with_description("List of Groups"),
            )
    }

    fn validate(&self, config: &Value) -> Vec<Diagnostic> {
        check_enum(config, "type", |s: &str| s.parse::<GroupType>())
            .into_iter()
            .collect()
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let query: GroupsQuery = decode(config)?;
        let group_type = query
            .group_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::parse::<GroupType>)
            .transpose()
            .map_err(|e| ProviderError::Validation(e.to_string()))?;

        let filter = GroupsFilter {
            name: query.name.clone(),
            group_type,
            is_active: query.is_active,
        };
        let groups: Vec<GroupSummary> = client
            .filter_groups(&filter)
            .await?
            .into_iter()
            .map(GroupSummary::from)
            .collect();

        let id = filter.name().unwrap_or(ALL_ID).to_string();
        Ok(json!({
            "id": id,
            "name": query.name,
            "type": query.group_type,
            "is_active": query.is_active,
            "groups": encode(&groups)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::tests::provider;
    use super::super::{GROUP, GROUPS};
    use super::*;
    use crate::server::ProviderService;
    use crate::testing::{assert_error_contains, assert_plan_no_changes, MockTransport};

    fn node(id: &str, name: &str) -> Value {
        json!({"id": id, "name": name, "type": "MANUAL", "isActive": true})
    }

    #[tokio::test]
    async fn test_create_without_users() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"groupCreate": {"ok": true, "error": null, "entity": node("g1", "Eng")}}));

        let state = provider(&mock)
            .create(GROUP, json!({"id": null, "name": "Eng", "user_ids": null, "type": null, "is_active": null}))
            .await
            .unwrap();
        assert_eq!(
            state,
            json!({"id": "g1", "name": "Eng", "user_ids": null, "type": "MANUAL", "is_active": true})
        );
        assert_eq!(mock.requests()[0].body["variables"], json!({"name": "Eng"}));
    }

    #[tokio::test]
    async fn test_read_pages_members() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"group": {
            "id": "g1", "name": "Eng", "type": "MANUAL", "isActive": true,
            "users": {"pageInfo": {"endCursor": "c1", "hasNextPage": true}, "edges": [{"node": {"id": "u1"}}]}
        }}));
        mock.respond_data(json!({"group": {
            "users": {"pageInfo": {"hasNextPage": false}, "edges": [{"node": {"id": "u2"}}]}
        }}));

        let state = provider(&mock)
            .read(GROUP, json!({"id": "g1", "name": "Eng", "user_ids": ["u2", "u1"]}))
            .await
            .unwrap();
        assert_eq!(state["user_ids"], json!(["u1", "u2"]));
    }

    #[tokio::test]
    async fn test_read_keeps_group_on_empty_trailing_page() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"group": {
            "id": "g1", "name": "Eng", "type": "MANUAL", "isActive": true,
            "users": {"pageInfo": {"endCursor": "c1", "hasNextPage": true}, "edges": [{"node": {"id": "u1"}}]}
        }}));
        mock.respond_data(json!({"group": {
            "users": {"pageInfo": {"hasNextPage": false}, "edges": []}
        }}));

        let state = provider(&mock)
            .read(GROUP, json!({"id": "g1", "name": "Eng", "user_ids": ["u1"]}))
            .await
            .unwrap();
        assert_eq!(state["id"], "g1");
        assert_eq!(state["user_ids"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_plan_ignores_member_order() {
        let mock = Arc::new(MockTransport::new());
        let prior = json!({"id": "g1", "name": "Eng", "user_ids": ["u1", "u2"], "type": "MANUAL", "is_active": true});
        let plan = provider(&mock)
            .plan(GROUP, Some(prior), json!({"name": "Eng", "user_ids": ["u2", "u1"]}), Value::Null)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
    }

    #[tokio::test]
    async fn test_update_sends_membership_delta() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"groupUpdate": {"ok": true, "error": null, "entity": node("g1", "Eng")}}));

        let state = provider(&mock)
            .update(
                GROUP,
                json!({"id": "g1", "name": "Eng", "user_ids": ["u1", "u2"]}),
                json!({"id": "g1", "name": "Eng", "user_ids": ["u2", "u3"]}),
            )
            .await
            .unwrap();
        assert_eq!(state["user_ids"], json!(["u2", "u3"]));

        let variables = &mock.requests()[0].body["variables"];
        assert_eq!(variables["addedUserIds"], json!(["u3"]));
        assert_eq!(variables["removedUserIds"], json!(["u1"]));
    }

    #[tokio::test]
    async fn test_groups_filter_validation() {
        let mock = Arc::new(MockTransport::new());
        let diagnostics = provider(&mock)
            .validate_data_source_config(GROUPS, json!({"type": "CUSTOM"}))
            .await
            .unwrap();
        assert_error_contains(&diagnostics, "unknown group type `CUSTOM`");
    }

    #[tokio::test]
    async fn test_groups_by_name() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"groups": {
            "pageInfo": {"hasNextPage": false},
            "edges": [{"node": node("g1", "Eng")}]
        }}));

        let state = provider(&mock)
            .read_data_source(GROUPS, json!({"name": "Eng", "type": "MANUAL"}))
            .await
            .unwrap();
        assert_eq!(state["id"], "Eng");
        assert_eq!(
            state["groups"],
            json!([{"id": "g1", "name": "Eng", "type": "MANUAL", "is_active": true}])
        );
        assert_eq!(
            mock.requests()[0].body["variables"]["filter"]["type"],
            json!({"in": ["MANUAL"]})
        );
    }

    #[tokio::test]
    async fn test_group_data_source() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"group": node("g1", "Eng")}));

        let state = provider(&mock).read_data_source(GROUP, json!({"id": "g1"})).await.unwrap();
        assert_eq!(state, json!({"id": "g1", "name": "Eng", "type": "MANUAL", "is_active": true}));
    }
}
