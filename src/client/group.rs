use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiError, Cause};
use super::gql::{EntityPayload, IdRef, OkError, Operation, Variables, GROUP};
use super::pagination::Connection;
use super::Client;
use crate::model::{Group, GroupType, GroupUpdate, GroupsFilter};

const CURSOR: &str = "groupsEndCursor";
const USERS_CURSOR: &str = "usersEndCursor";

const CREATE: &str = "mutation createGroup($name: String!, $userIds: [ID]) {
  groupCreate(name: $name, userIds: $userIds) {
    ok
    error
    entity { id name type isActive }
  }
}";

const READ: &str = "query readGroup($id: ID!, $usersEndCursor: String, $pageLimit: Int) {
  group(id: $id) {
    id
    name
    type
    isActive
    users(after: $usersEndCursor, first: $pageLimit) {
      pageInfo { endCursor hasNextPage }
      edges { node { id } }
    }
  }
}";

const READ_USERS: &str = "query readGroupUsers($id: ID!, $usersEndCursor: String, $pageLimit: Int) {
  group(id: $id) {
    users(after: $usersEndCursor, first: $pageLimit) {
      pageInfo { endCursor hasNextPage }
      edges { node { id } }
    }
  }
}";

const READ_ALL: &str = "query readGroups($filter: GroupFilterInput, $groupsEndCursor: String, $pageLimit: Int) {
  groups(filter: $filter, after: $groupsEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node { id name type isActive } }
  }
}";

const UPDATE: &str = "mutation updateGroup($id: ID!, $name: String, $addedUserIds: [ID], $removedUserIds: [ID]) {
  groupUpdate(id: $id, name: $name, addedUserIds: $addedUserIds, removedUserIds: $removedUserIds) {
    ok
    error
    entity { id name type isActive }
  }
}";

const DELETE: &str = "mutation deleteGroup($id: ID!) {
  groupDelete(id: $id) { ok error }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlGroup {
    id: String,
    name: String,
    #[serde(rename = "type", default)]
    group_type: GroupType,
    #[serde(default)]
    is_active: bool,
    #[serde(default)]
    users: Connection<IdRef>,
}

#[derive(Debug, Deserialize)]
struct GqlGroupUsers {
    #[serde(default)]
    users: Connection<IdRef>,
}

impl GqlGroup {
    fn into_model(self, users: Vec<String>) -> Group {
        Group {
            id: self.id,
            name: self.name,
            group_type: self.group_type,
            is_active: self.is_active,
            users,
        }
    }
}

/// Server-side filter. Without explicit criteria only active groups of any
/// type are returned.
fn filter_input(filter: &GroupsFilter) -> Value {
    let types: Vec<&str> = match filter.group_type {
        Some(group_type) => vec![group_type.as_str()],
        None => GroupType::ALL.to_vec(),
    };

    let mut input = json!({
        "type": {"in": types},
        "isActive": {"eq": filter.is_active.unwrap_or(true)},
    });
    if let Some(name) = filter.name() {
        input["name"] = json!({"eq": name});
    }
    input
}

impl Client {
    pub async fn create_group(&self, name: &str, user_ids: &[String]) -> Result<Group, ApiError> {
        let op = Operation::create(GROUP);
        if name.is_empty() {
            return Err(op.error(Cause::NameIsEmpty));
        }

        let mut variables = Variables::new().var("name", name);
        if !user_ids.is_empty() {
            variables = variables.ids("userIds", user_ids);
        }

        let payload: Option<EntityPayload<GqlGroup>> = self
            .graphql_field(op, CREATE, "groupCreate", variables)
            .await
            .map_err(|e| op.error_with_name(e, name))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(|group| group.into_model(user_ids.to_vec()))
            .map_err(|e| op.error_with_name(e, name))
    }

    /// Read a group with every member user id.
    pub async fn read_group(&self, id: &str) -> Result<Group, ApiError> {
        let op = Operation::read(GROUP);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let variables = Variables::new()
            .id(id)
            .cursor(USERS_CURSOR, None)
            .page_limit(self.page_limit);
        let node: Option<GqlGroup> = self
            .graphql_field(op, READ, "group", variables)
            .await
            .map_err(|e| op.error_with_id(e, id))?;
        let mut node = node.ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, id))?;

        let users_op = Operation::read(GROUP).named("readGroupUsers");
        let users = std::mem::take(&mut node.users)
            .fetch_pages(|cursor| {
                let variables = Variables::new()
                    .id(id)
                    .cursor(USERS_CURSOR, Some(&cursor))
                    .page_limit(self.page_limit);
                async move {
                    self.graphql_field::<GqlGroupUsers>(users_op, READ_USERS, "group", variables)
                        .await?
                        .map(|group| group.users)
                        .ok_or(Cause::ResultIsEmpty)
                }
            })
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        let users = users.into_nodes().into_iter().map(|user| user.id).collect();
        Ok(node.into_model(users))
    }

    /// Read active groups of any type.
    pub async fn read_groups(&self) -> Result<Vec<Group>, ApiError> {
        self.filter_groups(&GroupsFilter::default()).await
    }

    pub async fn read_groups_by_name(&self, name: &str) -> Result<Vec<Group>, ApiError> {
        if name.is_empty() {
            return Err(Operation::read(GROUP).error(Cause::GroupNameIsEmpty));
        }

        self.filter_groups(&GroupsFilter {
            name: Some(name.to_string()),
            ..Default::default()
        })
        .await
    }

    /// List groups matching `filter`. No match is an empty list.
    pub async fn filter_groups(&self, filter: &GroupsFilter) -> Result<Vec<Group>, ApiError> {
        let op = Operation::read(GROUP).named("readGroups");
        let variables = Variables::new().var("filter", filter_input(filter));

        let nodes: Vec<GqlGroup> = self
            .graphql_all(op, READ_ALL, "groups", CURSOR, variables)
            .await
            .map_err(|e| match filter.name() {
                Some(name) => op.error_with_name(e, name),
                None => op.error_with_id(e, "All"),
            })?;

        Ok(nodes
            .into_iter()
            .map(|node| node.into_model(Vec::new()))
            .filter(|group| filter.matches(group))
            .collect())
    }

    /// Rename a group and apply the membership delta.
    pub async fn update_group(&self, update: &GroupUpdate) -> Result<Group, ApiError> {
        let op = Operation::update(GROUP);
        if update.id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }
        if update.name.is_empty() {
            return Err(op.error_with_id(Cause::NameIsEmpty, &update.id));
        }

        let mut variables = Variables::new().id(&update.id).var("name", &update.name);
        let added = update.added_users();
        if !added.is_empty() {
            variables = variables.ids("addedUserIds", &added);
        }
        let removed = update.removed_users();
        if !removed.is_empty() {
            variables = variables.ids("removedUserIds", &removed);
        }

        let payload: Option<EntityPayload<GqlGroup>> = self
            .graphql_field(op, UPDATE, "groupUpdate", variables)
            .await
            .map_err(|e| op.error_with_id(e, &update.id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(EntityPayload::into_entity)
            .map(|group| group.into_model(update.new_users.clone()))
            .map_err(|e| op.error_with_id(e, &update.id))
    }

    pub async fn delete_group(&self, id: &str) -> Result<(), ApiError> {
        let op = Operation::delete(GROUP);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let payload: Option<OkError> = self
            .graphql_field(op, DELETE, "groupDelete", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        payload
            .ok_or(Cause::ResultIsEmpty)
            .and_then(OkError::into_result)
            .map_err(|e| op.error_with_id(e, id))
    }
}
