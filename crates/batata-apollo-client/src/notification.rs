//! Notification long polling
//!
//! `GET /notifications/v2?appId=&cluster=&notifications=[...]` carries the last
//! notification id seen for every namespace. The server holds the request open
//! until one of them moves on (200 with the new ids) or its own timeout hits
//! (304). Changed namespaces are then pulled in one batch, and a namespace's
//! id only advances once its pull succeeded, so a failed pull is retried on
//! the next round.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::batch::BatchFetcher;
use crate::config::ClientConfig;
use crate::fetcher::CONTENT_TYPE_JSON;
use crate::model::{ApolloConfigNotification, INITIAL_NOTIFICATION_ID, PollResult};

/// Tracks notification ids and turns server notifications into batch pulls
pub struct NotificationPoller {
    client: Client,
    config: Arc<ClientConfig>,
    batch: BatchFetcher,
    notifications: BTreeMap<String, i64>,
}

impl NotificationPoller {
    pub fn new(client: Client, config: Arc<ClientConfig>, batch: BatchFetcher) -> Self {
        let notifications = config
            .namespaces
            .iter()
            .map(|ns| ns.trim())
            .filter(|ns| !ns.is_empty())
            .map(|ns| (ns.to_string(), INITIAL_NOTIFICATION_ID))
            .collect();

        Self {
            client,
            config,
            batch,
            notifications,
        }
    }

    pub fn batch(&self) -> &BatchFetcher {
        &self.batch
    }

    /// Tracked notification id of a configured namespace
    pub fn notification_id(&self, namespace: &str) -> Option<i64> {
        self.notifications.get(namespace).copied()
    }

    pub fn notifications(&self) -> &BTreeMap<String, i64> {
        &self.notifications
    }

    fn notifications_url(&self) -> String {
        format!("{}/notifications/v2", self.config.base_url())
    }

    fn notifications_param(&self) -> Result<String, serde_json::Error> {
        let list: Vec<ApolloConfigNotification> = self
            .notifications
            .iter()
            .map(|(ns, id)| ApolloConfigNotification::new(ns.as_str(), *id))
            .collect();
        serde_json::to_string(&list)
    }

    /// Namespaces whose server id differs from the tracked one, with the new id.
    fn change_set(&self, remote: &[ApolloConfigNotification]) -> BTreeMap<String, i64> {
        let mut changes = BTreeMap::new();
        for notification in remote {
            match self.notifications.get(&notification.namespace_name) {
                Some(&tracked) if tracked != notification.notification_id => {
                    changes.insert(
                        notification.namespace_name.clone(),
                        notification.notification_id,
                    );
                }
                Some(_) => {}
                None => debug!(
                    namespace = %notification.namespace_name,
                    "Ignoring notification for unwatched namespace"
                ),
            }
        }
        changes
    }

    /// Run one long-poll round, pulling whatever changed.
    pub async fn poll_once(&mut self) -> PollResult {
        let notifications = match self.notifications_param() {
            Ok(n) => n,
            Err(e) => return PollResult::ServerError(e.to_string()),
        };

        debug!(notifications = %notifications, "Polling for config changes");

        let response = self
            .client
            .get(self.notifications_url())
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .timeout(self.config.interval_timeout())
            .query(&[
                ("appId", self.config.app_id.as_str()),
                ("cluster", self.config.cluster.as_str()),
                ("notifications", notifications.as_str()),
            ])
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!("Notification request failed: {}", e);
                return PollResult::ServerError(e.to_string());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return PollResult::ServerError(e.to_string()),
        };

        match status {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                debug!("No config change");
                return PollResult::NoChange;
            }
            status => {
                warn!(status = status.as_u16(), "Notification request rejected: {}", body);
                if body.is_empty() {
                    return PollResult::ServerError(format!("HTTP {}", status));
                }
                return PollResult::ServerError(body);
            }
        }

        let remote: Vec<ApolloConfigNotification> = match serde_json::from_str(&body) {
            Ok(list) => list,
            Err(e) => {
                warn!("Invalid notification response: {}", e);
                return PollResult::ServerError(format!("invalid notification response: {}", e));
            }
        };

        let changes = self.change_set(&remote);
        let namespaces: BTreeSet<String> = changes.keys().cloned().collect();
        let outcomes = self.batch.fetch_many(&namespaces).await;

        let mut applied = BTreeSet::new();
        for (namespace, outcome) in outcomes {
            if !outcome.succeeded {
                continue;
            }
            if let Some(&id) = changes.get(&namespace)
                && let Some(tracked) = self.notifications.get_mut(&namespace)
            {
                *tracked = id;
                applied.insert(namespace);
            }
        }

        if !changes.is_empty() {
            info!(
                changed = changes.len(),
                applied = applied.len(),
                "Config change round finished"
            );
        }
        PollResult::Changed(applied)
    }
}
