use serde::Deserialize;

use super::error::{ApiError, Cause};
use super::gql::{Operation, Variables, USER};
use super::Client;
use crate::model::User;

const CURSOR: &str = "usersEndCursor";

const READ: &str = "query readUser($id: ID!) {
  user(id: $id) { id firstName lastName email role }
}";

const READ_ALL: &str = "query readUsers($usersEndCursor: String, $pageLimit: Int) {
  users(after: $usersEndCursor, first: $pageLimit) {
    pageInfo { endCursor hasNextPage }
    edges { node { id firstName lastName email role } }
  }
}";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GqlUser {
    id: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    role: String,
}

impl From<GqlUser> for User {
    fn from(node: GqlUser) -> Self {
        Self {
            id: node.id,
            first_name: node.first_name,
            last_name: node.last_name,
            email: node.email,
            role: node.role,
        }
    }
}

impl Client {
    pub async fn read_user(&self, id: &str) -> Result<User, ApiError> {
        let op = Operation::read(USER);
        if id.is_empty() {
            return Err(op.error(Cause::IdIsEmpty));
        }

        let node: Option<GqlUser> = self
            .graphql_field(op, READ, "user", Variables::new().id(id))
            .await
            .map_err(|e| op.error_with_id(e, id))?;

        node.map(User::from)
            .ok_or_else(|| op.error_with_id(Cause::ResultIsEmpty, id))
    }

    pub async fn read_users(&self) -> Result<Vec<User>, ApiError> {
        let op = Operation::read(USER).named("readUsers");

        let nodes: Vec<GqlUser> = self
            .graphql_all(op, READ_ALL, "users", CURSOR, Variables::new())
            .await
            .map_err(|e| op.error_with_id(e, "All"))?;

        Ok(nodes.into_iter().map(User::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::testing::MockTransport;

    #[tokio::test]
    async fn test_read_user() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"user": {
            "id": "u1",
            "firstName": "Ada",
            "lastName": "Lovelace",
            "email": "ada@example.com",
            "role": "ADMIN"
        }}));
        let client = Client::new(mock.clone(), "acme", "twingate.com");

        let user = client.read_user("u1").await.unwrap();
        assert_eq!(user.first_name, "Ada");
        assert!(user.is_admin());
    }

    #[tokio::test]
    async fn test_read_user_not_found() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"user": null}));
        let client = Client::new(mock, "acme", "twingate.com");

        let err = client.read_user("u1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to read user with id u1: query result is empty"
        );
    }

    #[tokio::test]
    async fn test_read_users() {
        let mock = Arc::new(MockTransport::new());
        mock.respond_data(json!({"users": {
            "pageInfo": {"endCursor": "c1", "hasNextPage": true},
            "edges": [{"node": {"id": "u1", "role": "MEMBER"}}]
        }}));
        mock.respond_data(json!({"users": {
            "pageInfo": {"endCursor": "c2", "hasNextPage": false},
            "edges": [{"node": {"id": "u2", "role": "ADMIN"}}]
        }}));
        let client = Client::new(mock.clone(), "acme", "twingate.com");

        let users = client.read_users().await.unwrap();
        assert_eq!(users.len(), 2);
        assert!(!users[0].is_admin());
        assert!(users[1].is_admin());
        assert_eq!(mock.requests()[1].body["variables"]["usersEndCursor"], "c1");
    }
}
