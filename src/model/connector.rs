/// An agent process deployed inside a remote network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Connector {
    pub id: String,
    pub name: String,
    pub remote_network_id: String,
    /// `None` when the API did not report the flag.
    pub status_updates_enabled: Option<bool>,
}

/// Credentials a connector uses to authenticate.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConnectorTokens {
    pub connector_id: String,
    pub access_token: String,
    pub refresh_token: String,
}

impl std::fmt::Debug for ConnectorTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorTokens")
            .field("connector_id", &self.connector_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}
