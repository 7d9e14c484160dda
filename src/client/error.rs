//! Error types for the Twingate API client.
//!
//! Every client operation returns an [`ApiError`] that names the operation,
//! the kind of object involved and, when known, its id or name. The root
//! cause is kept as a [`Cause`] so callers can match on it.

use thiserror::Error;

/// Failures raised by the HTTP transport before a GraphQL payload is decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No API token was configured.
    #[error("api_token not set")]
    ApiTokenNotSet,

    /// The server answered with a non-200 status.
    #[error("request {url} failed, status {status}, body {body}")]
    Http {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// The request did not complete within the configured timeout.
    #[error("request {url} timed out")]
    Timeout {
        /// Requested URL.
        url: String,
    },

    /// The TLS certificate presented by the server does not match its name.
    #[error("certificate for {url} is not valid: {detail}")]
    Certificate {
        /// Requested URL.
        url: String,
        /// Error reported by the TLS stack.
        detail: String,
    },

    /// The request could not be sent or its body could not be read.
    #[error("can't execute http request: {0}")]
    Request(String),

    /// The underlying HTTP client could not be built.
    #[error("can't build http client: {0}")]
    Client(String),
}

impl TransportError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => is_retryable_status(*status),
            Self::Timeout { .. } | Self::Request(_) => true,
            Self::ApiTokenNotSet | Self::Certificate { .. } | Self::Client(_) => false,
        }
    }
}

/// Status codes worth retrying: rate limiting and transient server failures.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    status == 429 || (status >= 500 && status != 501)
}

/// The root cause of an [`ApiError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Cause {
    /// An id argument was empty.
    #[error("id is empty")]
    IdIsEmpty,

    /// A name argument was empty.
    #[error("name is empty")]
    NameIsEmpty,

    /// Neither an id nor a name was given for a lookup.
    #[error("both name and id should not be empty")]
    EmptyBothNameAndId,

    /// The API returned no object for the query.
    #[error("query result is empty")]
    ResultIsEmpty,

    /// A connector id argument was empty.
    #[error("connector id is empty")]
    ConnectorIdIsEmpty,

    /// A remote network id argument was empty.
    #[error("network id is empty")]
    NetworkIdIsEmpty,

    /// A remote network name argument was empty.
    #[error("network name is empty")]
    NetworkNameIsEmpty,

    /// A group name argument was empty.
    #[error("group name is empty")]
    GroupNameIsEmpty,

    /// A mutation answered with `ok: false`.
    #[error("{0}")]
    Mutation(String),

    /// The GraphQL response carried an `errors` array.
    #[error("{0}")]
    Graphql(String),

    /// The HTTP transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response body could not be decoded.
    #[error("can't parse response body: {0}")]
    Decode(String),
}

impl From<serde_json::Error> for Cause {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// A failed client operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Operation verb, e.g. `create`.
    pub operation: String,
    /// Object kind, e.g. `remote network`.
    pub resource: String,
    /// Id of the object, when known.
    pub id: Option<String>,
    /// Name of the object, when known.
    pub name: Option<String>,
    /// Root cause.
    pub cause: Cause,
}

impl ApiError {
    /// Create an error without an id or name.
    pub fn new(cause: Cause, operation: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            resource: resource.into(),
            id: None,
            name: None,
            cause,
        }
    }

    /// Attach the object id. Empty ids are ignored.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        if !id.is_empty() {
            self.id = Some(id);
        }
        self
    }

    /// Attach the object name. Empty names are ignored.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !name.is_empty() {
            self.name = Some(name);
        }
        self
    }

    /// Whether the object no longer exists upstream.
    pub fn is_not_found(&self) -> bool {
        matches!(self.cause, Cause::ResultIsEmpty)
    }

    /// Whether the API answered and refused the request, as opposed to the
    /// request never getting a definitive answer.
    pub fn is_rejected(&self) -> bool {
        match &self.cause {
            Cause::Graphql(_) | Cause::Mutation(_) => true,
            Cause::Transport(TransportError::Http { status, .. }) => {
                (400..500).contains(status) && *status != 429
            },
            _ => false,
        }
    }

    /// Whether the failure was caused by an empty argument.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self.cause,
            Cause::IdIsEmpty
                | Cause::NameIsEmpty
                | Cause::EmptyBothNameAndId
                | Cause::ConnectorIdIsEmpty
                | Cause::NetworkIdIsEmpty
                | Cause::NetworkNameIsEmpty
                | Cause::GroupNameIsEmpty
        )
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to {} {}", self.operation, self.resource)?;
        if let Some(id) = &self.id {
            write!(f, " with id {}", id)?;
        }
        if let Some(name) = &self.name {
            write!(f, " with name {}", name)?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::new(Cause::NetworkNameIsEmpty, "create", "remote network");
        assert_eq!(
            err.to_string(),
            "failed to create remote network: network name is empty"
        );

        let err = ApiError::new(Cause::ResultIsEmpty, "read", "group").with_id("R3JvdXA6MQ==");
        assert_eq!(
            err.to_string(),
            "failed to read group with id R3JvdXA6MQ==: query result is empty"
        );

        let err = ApiError::new(Cause::Mutation("duplicate".into()), "read", "remote network")
            .with_name("office");
        assert_eq!(
            err.to_string(),
            "failed to read remote network with name office: duplicate"
        );
    }

    #[test]
    fn test_api_error_ignores_empty_attrs() {
        let err = ApiError::new(Cause::IdIsEmpty, "delete", "resource")
            .with_id("")
            .with_name("");
        assert!(err.id.is_none());
        assert!(err.name.is_none());
        assert!(err.is_invalid_input());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_rejected() {
        let http = |status| {
            ApiError::new(
                Cause::Transport(TransportError::Http {
                    url: "u".into(),
                    status,
                    body: String::new(),
                }),
                "verify",
                "connector tokens",
            )
        };
        assert!(http(401).is_rejected());
        assert!(http(403).is_rejected());
        assert!(!http(429).is_rejected());
        assert!(!http(503).is_rejected());
        assert!(ApiError::new(Cause::Graphql("bad token".into()), "verify", "connector tokens").is_rejected());

        let timeout = Cause::Transport(TransportError::Timeout { url: "u".into() });
        assert!(!ApiError::new(timeout, "verify", "connector tokens").is_rejected());
        let refused = Cause::Transport(TransportError::Request("connection refused".into()));
        assert!(!ApiError::new(refused, "verify", "connector tokens").is_rejected());
    }

    #[test]
    fn test_http_error_display() {
        let err = TransportError::Http {
            url: "https://acme.twingate.com/api/graphql/".into(),
            status: 500,
            body: "oops".into(),
        };
        assert_eq!(
            err.to_string(),
            "request https://acme.twingate.com/api/graphql/ failed, status 500, body oops"
        );
        let cause: Cause = err.into();
        assert!(cause.to_string().starts_with("request https://"));
    }

    #[test]
    fn test_transport_retryable() {
        assert!(!TransportError::ApiTokenNotSet.is_retryable());
        assert!(!TransportError::Certificate {
            url: "u".into(),
            detail: "certificate is valid for other.com".into()
        }
        .is_retryable());
        assert!(TransportError::Timeout { url: "u".into() }.is_retryable());
        assert!(TransportError::Request("connection reset".into()).is_retryable());

        for (status, retryable) in [
            (400, false),
            (401, false),
            (404, false),
            (429, true),
            (500, true),
            (501, false),
            (502, true),
            (503, true),
            (504, true),
        ] {
            let err = TransportError::Http {
                url: "u".into(),
                status,
                body: String::new(),
            };
            assert_eq!(err.is_retryable(), retryable, "status {}", status);
        }
    }
}
