// Remote store client for a realtime-database REST endpoint.
//
// Documents live at `{base_url}/{collection}/{auction_id}.json`. A `GET` of
// a path nobody has written returns the JSON literal `null`; a `PUT`
// replaces the whole document.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::Value;
use tracing::debug;

use super::error::{RemoteResult, RemoteStoreError};
use super::RemoteStore;
use crate::config::RemoteConfig;

#[derive(Clone)]
pub struct HttpRemoteStore {
    client: Client,
    base_url: Arc<str>,
    collection: Arc<str>,
    auth_token: Option<Arc<str>>,
}

impl HttpRemoteStore {
    /// Build a client for the configured endpoint. No request is made until
    /// the first fetch or write.
    pub fn new(config: &RemoteConfig) -> RemoteResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| RemoteStoreError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            collection: Arc::from(config.collection.trim_matches('/')),
            auth_token: config.auth_token.as_deref().map(Arc::from),
        })
    }

    fn document_path(&self, auction_id: &str) -> String {
        format!("{}/{}.json", self.collection, auction_id)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token.as_ref())]),
            None => builder,
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch(&self, auction_id: &str) -> RemoteResult<Option<Value>> {
        let path = self.document_path(auction_id);
        let response = self
            .request(Method::GET, &path)
            .send()
            .await
            .map_err(|source| RemoteStoreError::RequestSend {
                path: path.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let body = response
                    .json::<Value>()
                    .await
                    .map_err(|source| RemoteStoreError::DecodeResponse {
                        path: path.clone(),
                        source,
                    })?;
                debug!(%path, "fetched remote document");
                Ok((!body.is_null()).then_some(body))
            }
            other => Err(RemoteStoreError::RequestStatus {
                path,
                status: other,
            }),
        }
    }

    async fn write(&self, auction_id: &str, document: &Value) -> RemoteResult<()> {
        let path = self.document_path(auction_id);
        let response = self
            .request(Method::PUT, &path)
            .json(document)
            .send()
            .await
            .map_err(|source| RemoteStoreError::RequestSend {
                path: path.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(RemoteStoreError::RequestStatus {
                path,
                status: response.status(),
            })
        }
    }
}
