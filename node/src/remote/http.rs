//! REST document collection over HTTP.
//!
//! - `GET {base}/{collection}` returns the documents as a JSON array of
//!   `{"id": .., "data": {..}}`, ordered by creation
//! - `PATCH {base}/{collection}/{id}?merge=true` writes fields
//! - `DELETE {base}/{collection}/{id}` removes a document
//!
//! The collection has no push channel, so a subscription polls and diffs
//! consecutive fetches.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use waypost_engine::{RawDocument, RemoteSnapshot};

use super::{RemoteResult, RemoteStore, Subscription};
use crate::error::RemoteError;

/// Connection settings for [`HttpRemote`].
#[derive(Debug, Clone)]
pub struct HttpRemoteConfig {
    /// Base URL, without a trailing slash
    pub base_url: String,
    /// Collection path segment
    pub collection: String,
    /// How often a subscription polls for changes
    pub poll_interval: Duration,
    /// Per-request timeout
    pub timeout: Duration,
    /// Sent as a bearer token when set
    pub auth_token: Option<String>,
}

impl HttpRemoteConfig {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(10),
            auth_token: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }
}

/// [`RemoteStore`] backed by a REST collection.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: Client,
    config: Arc<HttpRemoteConfig>,
}

impl HttpRemote {
    pub fn new(config: HttpRemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config: Arc::new(config),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.config.base_url, self.config.collection)
    }

    fn document_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Whether the collection answers at all.
    pub async fn probe(&self) -> bool {
        match self.request(Method::GET, self.collection_url()).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                tracing::debug!(error = %e, "Remote probe failed");
                false
            }
        }
    }

    fn spawn_poller(
        &self,
        mut previous: Vec<RawDocument>,
        tx: mpsc::UnboundedSender<RemoteSnapshot>,
    ) -> tokio::task::JoinHandle<()> {
        let remote = self.clone();
        let period = self.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                let documents = match remote.fetch_all().await {
                    Ok(documents) => documents,
                    Err(e) => {
                        tracing::warn!(error = %e, "Remote poll failed");
                        continue;
                    }
                };

                let snapshot = RemoteSnapshot::from_transition(&previous, documents.clone());
                if snapshot.changes.is_empty() {
                    continue;
                }
                previous = documents;

                if tx.send(snapshot).is_err() {
                    break;
                }
            }
        })
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch_all(&self) -> RemoteResult<Vec<RawDocument>> {
        let documents = self
            .request(Method::GET, self.collection_url())
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<RawDocument>>()
            .await?;
        Ok(documents)
    }

    async fn subscribe(&self) -> RemoteResult<Subscription> {
        let documents = self.fetch_all().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(RemoteSnapshot::initial(documents.clone()));
        let poller = self.spawn_poller(documents, tx);

        tracing::debug!(collection = %self.config.collection, "Polling subscription started");
        Ok(Subscription::new(rx, move || poller.abort()))
    }

    async fn write(&self, id: &str, fields: Value, merge: bool) -> RemoteResult<()> {
        self.request(Method::PATCH, self.document_url(id))
            .query(&[("merge", merge)])
            .json(&fields)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> RemoteResult<()> {
        let response = self
            .request(Method::DELETE, self.document_url(id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }
}
