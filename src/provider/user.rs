use serde::Serialize;
use serde_json::{json, Value};

use super::state::{encode, id_of};
use super::DataSourceHandler;
use crate::client::Client;
use crate::error::ProviderError;
use crate::model::User;
use crate::schema::{Attribute, AttributeType, Schema};

const ALL_ID: &str = "all-users";

#[derive(Debug, Serialize)]
struct UserState {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    role: String,
    is_admin: bool,
}

impl From<User> for UserState {
    fn from(user: User) -> Self {
        Self {
            is_admin: user.is_admin(),
            id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            email: user.email,
            role: user.role,
        }
    }
}

pub(super) struct UserDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for UserDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Users in Twingate can be given access to Twingate Resources and may either be added manually or automatically synchronized with a 3rd party identity provider.")
            .with_attribute("id", Attribute::required_string().with_description("The ID of the User"))
            .with_attribute("first_name", Attribute::computed_string())
            .with_attribute("last_name", Attribute::computed_string())
            .with_attribute("email", Attribute::computed_string())
            .with_attribute("role", Attribute::computed_string())
            .with_attribute(
                "is_admin",
                Attribute::computed_bool().with_description("Indicates whether the User is an admin"),
            )
    }

    async fn read(&self, client: &Client, config: &Value) -> Result<Value, ProviderError> {
        let user = client.read_user(id_of(config)?).await?;
        encode(&UserState::from(user))
    }
}

pub(super) struct UsersDataSource;

#[async_trait::async_trait]
impl DataSourceHandler for UsersDataSource {
    fn schema(&self) -> Schema {
        Schema::v0()
            .with_description("Every User in the Twingate network.")
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "users",
                Attribute::computed_object_list([
                    ("id", AttributeType::String),
                    ("first_name", AttributeType::String),
                    ("last_name", AttributeType::String),
                    ("email", AttributeType::String),
                    ("role", AttributeType::String),
                    ("is_admin", AttributeType::Bool),
                ])
                .with_description("List of Users"),
            )
    }

    async fn read(&self, client: &Client, _config: &Value) -> Result<Value, ProviderError> {
        let users: Vec<UserState> = client.read_users().await?.into_iter().map(UserState::from).collect();
        Ok(json!({"id": ALL_ID, "users": encode(&users)?}))
    }
}
