//! Bounded fan-out of namespace fetches
//!
//! All fetches of one round run concurrently, at most `fetch_concurrency` at
//! a time, and the call returns only once every namespace has an outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;

use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::fetcher::NamespaceFetcher;
use crate::model::FetchOutcome;

/// Fetches a set of namespaces with bounded parallelism
#[derive(Clone)]
pub struct BatchFetcher {
    fetcher: NamespaceFetcher,
    concurrency: usize,
}

impl BatchFetcher {
    pub fn new(fetcher: NamespaceFetcher, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    pub fn fetcher(&self) -> &NamespaceFetcher {
        &self.fetcher
    }

    /// One outcome per requested namespace, whatever happened to the others.
    pub async fn fetch_many(
        &self,
        namespaces: &BTreeSet<String>,
    ) -> BTreeMap<String, FetchOutcome> {
        if namespaces.is_empty() {
            return BTreeMap::new();
        }

        let outcomes = fetch_bounded(namespaces, self.concurrency, |namespace| {
            let fetcher = &self.fetcher;
            async move { fetcher.fetch(namespace).await }
        })
        .await;

        let failed = outcomes.values().filter(|o| !o.succeeded).count();
        debug!(
            total = outcomes.len(),
            failed = failed,
            "Batch pull finished"
        );
        outcomes
    }
}

/// Run `fetch` for every namespace with at most `limit` futures in flight.
async fn fetch_bounded<'a, F, Fut>(
    namespaces: &'a BTreeSet<String>,
    limit: usize,
    fetch: F,
) -> BTreeMap<String, FetchOutcome>
where
    F: Fn(&'a str) -> Fut,
    Fut: Future<Output = FetchOutcome>,
{
    stream::iter(namespaces.iter().map(|namespace| {
        let pending = fetch(namespace.as_str());
        async move { (namespace.clone(), pending.await) }
    }))
    .buffer_unordered(limit.max(1))
    .collect()
    .await
}
