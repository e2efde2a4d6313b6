//! Apollo wire models and per-round result types

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::ClientError;

/// Notification id of a namespace that has never been observed.
pub const INITIAL_NOTIFICATION_ID: i64 = -1;

/// Apollo configuration response
///
/// Body of `GET /configs/{appId}/{cluster}/{namespace}`; also the record kept
/// on disk for each namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApolloConfig {
    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub cluster: String,

    #[serde(default)]
    pub namespace_name: String,

    /// Release key for version tracking
    pub release_key: String,

    #[serde(default)]
    pub configurations: HashMap<String, String>,
}

/// Apollo configuration notification
///
/// Sent in the `notifications` query parameter of `/notifications/v2` and
/// returned by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApolloConfigNotification {
    pub namespace_name: String,

    pub notification_id: i64,

    /// Watched key details, only ever set by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub messages: Option<ApolloNotificationMessages>,
}

impl ApolloConfigNotification {
    pub fn new(namespace_name: impl Into<String>, notification_id: i64) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            notification_id,
            messages: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ApolloNotificationMessages {
    #[serde(default)]
    pub details: HashMap<String, i64>,
}

/// Result of one namespace fetch attempt.
#[derive(Debug)]
pub struct FetchOutcome {
    pub namespace: String,
    pub succeeded: bool,
    /// `true` when new content was written, `false` on "not modified" or failure
    pub updated: bool,
    pub error: Option<ClientError>,
}

impl FetchOutcome {
    pub fn updated(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            succeeded: true,
            updated: true,
            error: None,
        }
    }

    pub fn not_modified(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            succeeded: true,
            updated: false,
            error: None,
        }
    }

    pub fn failed(namespace: &str, error: ClientError) -> Self {
        Self {
            namespace: namespace.to_string(),
            succeeded: false,
            updated: false,
            error: Some(error),
        }
    }
}

/// Result of one notification poll round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Server answered 304: nothing changed before the long poll expired
    NoChange,
    /// Namespaces whose tracked notification id advanced this round
    Changed(BTreeSet<String>),
    /// Notification endpoint failed; carries the response body or error text
    ServerError(String),
}
