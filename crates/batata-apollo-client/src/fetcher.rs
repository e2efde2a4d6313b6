//! Conditional fetch of a single namespace
//!
//! `GET /configs/{appId}/{cluster}/{namespace}?ip=&releaseKey=`. The cached
//! release key lets the server answer 304 when nothing changed.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::model::{ApolloConfig, FetchOutcome};

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json;charset=UTF-8";

/// Fetches one namespace and keeps its cached record current
#[derive(Clone)]
pub struct NamespaceFetcher {
    client: Client,
    config: Arc<ClientConfig>,
    cache: CacheStore,
}

impl NamespaceFetcher {
    pub fn new(client: Client, config: Arc<ClientConfig>, cache: CacheStore) -> Self {
        Self {
            client,
            config,
            cache,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    fn config_url(&self, namespace: &str) -> String {
        format!(
            "{}/configs/{}/{}/{}",
            self.config.base_url(),
            self.config.app_id,
            self.config.cluster,
            namespace
        )
    }

    /// Fetch one namespace. Failures are reported in the outcome, never returned.
    pub async fn fetch(&self, namespace: &str) -> FetchOutcome {
        match self.try_fetch(namespace).await {
            Ok(true) => FetchOutcome::updated(namespace),
            Ok(false) => FetchOutcome::not_modified(namespace),
            Err(e) => {
                warn!(namespace = namespace, "Pull config failed: {}", e);
                FetchOutcome::failed(namespace, e)
            }
        }
    }

    /// Returns `Ok(true)` when new content was cached, `Ok(false)` on 304.
    async fn try_fetch(&self, namespace: &str) -> Result<bool> {
        let release_key = self.cache.read_release_key(namespace).unwrap_or_default();
        let url = self.config_url(namespace);

        debug!(
            namespace = namespace,
            release_key = %release_key,
            "Pulling config from {}",
            url
        );

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE_JSON)
            .timeout(self.config.pull_timeout())
            .query(&[
                ("ip", self.config.client_ip.as_str()),
                ("releaseKey", release_key.as_str()),
            ])
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let body = response.bytes().await?;
                let config: ApolloConfig = serde_json::from_slice(&body)?;
                self.cache.write(namespace, &config)?;
                info!(
                    namespace = namespace,
                    release_key = %config.release_key,
                    keys = config.configurations.len(),
                    "Config updated"
                );
                Ok(true)
            }
            StatusCode::NOT_MODIFIED => {
                debug!(namespace = namespace, "Config not modified");
                Ok(false)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ClientError::ServerRejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
