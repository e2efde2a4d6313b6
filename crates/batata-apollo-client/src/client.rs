//! Apollo client and its sync loop

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use reqwest::Client;
use tracing::{error, info};

use crate::batch::BatchFetcher;
use crate::cache::CacheStore;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::fetcher::NamespaceFetcher;
use crate::listener::ChangeListener;
use crate::model::{FetchOutcome, PollResult};
use crate::notification::NotificationPoller;

/// Apollo config client keeping a local cache in sync with the config service.
///
/// Rounds are driven through `&mut self`, so one round (poll plus all of its
/// pulls) finishes before the next starts.
pub struct ApolloClient {
    config: Arc<ClientConfig>,
    poller: NotificationPoller,
}

impl ApolloClient {
    /// Create a client. Fails when the config is missing required fields.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder().build()?;
        Ok(Self::with_http_client(config, client))
    }

    /// Create a client on top of an existing reqwest client.
    pub fn with_http_client(config: ClientConfig, client: Client) -> Self {
        let config = Arc::new(config);
        let cache = CacheStore::new(config.save_dir.clone());
        let fetcher = NamespaceFetcher::new(client.clone(), config.clone(), cache);
        let batch = BatchFetcher::new(fetcher, config.fetch_concurrency);
        let poller = NotificationPoller::new(client, config.clone(), batch);

        Self { config, poller }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn cache(&self) -> &CacheStore {
        self.poller.batch().fetcher().cache()
    }

    pub fn notification_id(&self, namespace: &str) -> Option<i64> {
        self.poller.notification_id(namespace)
    }

    pub fn notifications(&self) -> &BTreeMap<String, i64> {
        self.poller.notifications()
    }

    /// Pull a single namespace, bypassing notifications.
    pub async fn fetch(&self, namespace: &str) -> FetchOutcome {
        self.poller.batch().fetcher().fetch(namespace).await
    }

    /// Pull several namespaces with bounded parallelism.
    pub async fn fetch_many(
        &self,
        namespaces: &BTreeSet<String>,
    ) -> BTreeMap<String, FetchOutcome> {
        self.poller.batch().fetch_many(namespaces).await
    }

    /// Run one notification round.
    pub async fn poll_once(&mut self) -> PollResult {
        self.poller.poll_once().await
    }

    /// Poll once, or keep polling when `continuous`, until the notification
    /// endpoint fails or the listener returns an error.
    ///
    /// The listener runs after every round that got a 200 from the
    /// notification endpoint. A 304 round does not call it.
    ///
    /// There is no backoff between rounds. While a changed namespace keeps
    /// failing to pull, its id stays behind the server's, so a continuous run
    /// gets an immediate 200 and polls again without pausing.
    pub async fn run(
        &mut self,
        continuous: bool,
        listener: Option<&dyn ChangeListener>,
    ) -> Result<()> {
        info!(
            app_id = %self.config.app_id,
            cluster = %self.config.cluster,
            namespaces = self.poller.notifications().len(),
            continuous = continuous,
            "Start syncing apollo config"
        );

        loop {
            match self.poller.poll_once().await {
                PollResult::NoChange => {}
                PollResult::Changed(applied) => {
                    if !applied.is_empty() {
                        info!(namespaces = ?applied, "Apollo config changed");
                    }
                    if let Some(listener) = listener {
                        listener.on_change().map_err(ClientError::Callback)?;
                    }
                }
                PollResult::ServerError(detail) => {
                    error!("Apollo sync stopped: {}", detail);
                    return Err(ClientError::Server(detail));
                }
            }

            if !continuous {
                return Ok(());
            }
        }
    }
}
