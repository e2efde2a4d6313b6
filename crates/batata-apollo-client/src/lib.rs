//! Batata Apollo Client - keeps local Apollo namespace caches in sync
//!
//! This crate provides:
//! - A file-backed cache of namespace configurations keyed by release key
//! - Conditional single-namespace fetches and bounded batch fetches
//! - Long-polling on `/notifications/v2` to pull exactly what changed
//! - A sync loop that calls back after each change round

pub mod batch;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod listener;
pub mod model;
pub mod notification;

pub use batch::BatchFetcher;
pub use cache::CacheStore;
pub use client::ApolloClient;
pub use config::ClientConfig;
pub use error::{ClientError, Result};
pub use fetcher::NamespaceFetcher;
pub use listener::{ChangeListener, FnChangeListener};
pub use model::*;
pub use notification::NotificationPoller;
