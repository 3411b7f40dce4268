//! HTTP client backend speaking to a remote sync gateway.
//!
//! REST verbs map one-to-one onto the store primitives; subscriptions ride
//! the gateway's SSE watch endpoint, parsed incrementally from the byte
//! stream into a local watch channel. The configured namespace prefixes
//! every path so teams can share one gateway.

use std::sync::Arc;

use futures::{StreamExt, future::BoxFuture};
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;

use crate::config::ConnectConfig;

use super::{BoardStore, FieldMap, StoreError, StoreResult};

/// Errors specific to the HTTP transport, folded into [`StoreError`].
#[derive(Debug, Error)]
enum HttpStoreError {
    /// The HTTP client could not be constructed.
    #[error("failed to build http client")]
    ClientBuilder(#[source] reqwest::Error),
    /// The request could not be sent.
    #[error("request to `{url}` failed")]
    Send {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The gateway answered with a non-success status.
    #[error("request to `{url}` returned status {status}")]
    Status { url: String, status: StatusCode },
    /// The response body could not be decoded.
    #[error("response from `{url}` could not be decoded")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

impl From<HttpStoreError> for StoreError {
    fn from(err: HttpStoreError) -> Self {
        StoreError::unavailable(err.to_string(), err)
    }
}

/// Store backend talking to a remote gateway over HTTP.
#[derive(Clone)]
pub struct HttpStore {
    client: Client,
    base_url: Arc<str>,
    namespace: Arc<str>,
    token: Option<Arc<str>>,
}

impl HttpStore {
    /// Build a store from a connection configuration.
    pub fn connect(config: ConnectConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| StoreError::from(HttpStoreError::ClientBuilder(source)))?;
        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            namespace: Arc::from(config.namespace.as_str()),
            token: config.token.map(|token| Arc::from(token.as_str())),
        })
    }

    fn store_url(&self, path: &str) -> String {
        format!("{}/v1/store/{}/{path}", self.base_url, self.namespace)
    }

    fn watch_url(&self, path: &str) -> String {
        format!("{}/v1/watch/{}/{path}", self.base_url, self.namespace)
    }

    fn request(&self, method: Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        if let Some(ref token) = self.token {
            builder.bearer_auth(token.as_ref())
        } else {
            builder
        }
    }

    async fn send_payload(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> StoreResult<()> {
        let url = self.store_url(path);
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(&body);
        }
        let response = builder.send().await.map_err(|source| HttpStoreError::Send {
            url: url.clone(),
            source,
        })?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(HttpStoreError::Status {
                url,
                status: response.status(),
            }
            .into())
        }
    }

    async fn fetch_value(&self, path: &str) -> StoreResult<Value> {
        let url = self.store_url(path);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|source| HttpStoreError::Send {
                url: url.clone(),
                source,
            })?;
        if !response.status().is_success() {
            return Err(HttpStoreError::Status {
                url,
                status: response.status(),
            }
            .into());
        }
        response
            .json::<Value>()
            .await
            .map_err(|source| HttpStoreError::Decode { url, source }.into())
    }
}

impl BoardStore for HttpStore {
    fn write(&self, path: &str, value: Value) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move { store.send_payload(Method::PUT, &path, Some(value)).await })
    }

    fn update(&self, path: &str, fields: FieldMap) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            store
                .send_payload(Method::PATCH, &path, Some(Value::Object(fields)))
                .await
        })
    }

    fn remove(&self, path: &str) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move { store.send_payload(Method::DELETE, &path, None).await })
    }

    fn read_once(&self, path: &str) -> BoxFuture<'static, StoreResult<Value>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move { store.fetch_value(&path).await })
    }

    fn subscribe(&self, path: &str) -> BoxFuture<'static, StoreResult<watch::Receiver<Value>>> {
        let store = self.clone();
        let path = path.to_string();
        Box::pin(async move {
            // Seed with a snapshot so subscribers observe the current value
            // even before the stream delivers its initial event.
            let initial = store.fetch_value(&path).await?;
            let (sender, receiver) = watch::channel(initial);

            let url = store.watch_url(&path);
            tokio::spawn(async move {
                let response = match store.request(Method::GET, &url).send().await {
                    Ok(response) if response.status().is_success() => response,
                    Ok(response) => {
                        warn!(%url, status = %response.status(), "watch stream rejected");
                        return;
                    }
                    Err(error) => {
                        warn!(%url, %error, "failed to open watch stream");
                        return;
                    }
                };

                let mut stream = response.bytes_stream();
                let mut buffer = String::new();
                while let Some(chunk) = stream.next().await {
                    if sender.is_closed() {
                        break;
                    }
                    let chunk = match chunk {
                        Ok(chunk) => chunk,
                        Err(error) => {
                            warn!(%url, %error, "watch stream failed");
                            break;
                        }
                    };
                    buffer.push_str(&String::from_utf8_lossy(&chunk));
                    while let Some(boundary) = buffer.find("\n\n") {
                        let event = buffer[..boundary].to_string();
                        buffer.drain(..boundary + 2);
                        if let Some(value) = parse_event_data(&event) {
                            sender.send_replace(value);
                        }
                    }
                }
            });

            Ok(receiver)
        })
    }
}

/// Extract and parse the `data:` payload of one SSE event block.
///
/// Comment lines (keep-alives) and events without data are skipped;
/// multi-line data fields are joined the way the SSE spec prescribes.
fn parse_event_data(event: &str) -> Option<Value> {
    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|line| line.strip_prefix(' ').unwrap_or(line))
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return None;
    }
    match serde_json::from_str(&data) {
        Ok(value) => Some(value),
        Err(error) => {
            warn!(%error, "ignoring malformed watch event");
            None
        }
    }
}
