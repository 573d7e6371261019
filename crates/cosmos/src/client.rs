use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::Utc;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::auth::{master_key_token, ms_date, API_VERSION};

const HEADER_DATE: &str = "x-ms-date";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_UPSERT: &str = "x-ms-documentdb-is-upsert";
const HEADER_CONTINUATION: &str = "x-ms-continuation";

/// Client for the document endpoints of a single Cosmos DB SQL API container.
#[derive(Clone)]
pub struct CosmosClient {
    http: Client,
    endpoint: Url,
    key: Arc<[u8]>,
    database: String,
    container: String,
}

impl CosmosClient {
    /// Creates a client from the account endpoint and its base64 master key.
    pub fn new(
        endpoint: Url,
        master_key: &str,
        database: impl Into<String>,
        container: impl Into<String>,
        http: Client,
    ) -> Result<Self, CosmosError> {
        if endpoint.cannot_be_a_base() {
            return Err(CosmosError::InvalidEndpoint(endpoint.to_string()));
        }
        let key = STANDARD.decode(master_key.trim())?;

        Ok(Self {
            http,
            endpoint,
            key: Arc::from(key.into_boxed_slice()),
            database: database.into(),
            container: container.into(),
        })
    }

    /// Point read. Returns `Ok(None)` on 404.
    pub async fn read_document<T>(&self, id: &str) -> Result<Option<T>, CosmosError>
    where
        T: DeserializeOwned,
    {
        let response = self
            .document_request(Method::GET, id)?
            .header(HEADER_PARTITION_KEY, partition_key_header(id)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        parse_json(response).await.map(Some)
    }

    /// Reads the whole container, following continuation tokens until exhausted.
    pub async fn list_documents<T>(&self) -> Result<Vec<T>, CosmosError>
    where
        T: DeserializeOwned,
    {
        let mut documents = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.feed_request(Method::GET)?;
            if let Some(token) = continuation.as_deref() {
                request = request.header(HEADER_CONTINUATION, token);
            }
            let response = request.send().await?;

            let next = response
                .headers()
                .get(HEADER_CONTINUATION)
                .and_then(|value| value.to_str().ok())
                .filter(|value| !value.is_empty())
                .map(str::to_string);

            let page: DocumentFeed<T> = parse_json(response).await?;
            documents.extend(page.documents);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    /// Inserts a new document. A taken id comes back as a 409 status error.
    pub async fn create_document<T>(
        &self,
        partition_key: &str,
        document: &T,
    ) -> Result<T, CosmosError>
    where
        T: Serialize + DeserializeOwned,
    {
        let response = self
            .feed_request(Method::POST)?
            .header(HEADER_PARTITION_KEY, partition_key_header(partition_key)?)
            .json(document)
            .send()
            .await?;

        parse_json(response).await
    }

    /// Inserts or replaces a document in a single call.
    pub async fn upsert_document<T>(
        &self,
        partition_key: &str,
        document: &T,
    ) -> Result<T, CosmosError>
    where
        T: Serialize + DeserializeOwned,
    {
        let response = self
            .feed_request(Method::POST)?
            .header(HEADER_PARTITION_KEY, partition_key_header(partition_key)?)
            .header(HEADER_UPSERT, "True")
            .json(document)
            .send()
            .await?;

        parse_json(response).await
    }

    /// Deletes a document, returning `false` when it did not exist.
    pub async fn delete_document(&self, id: &str) -> Result<bool, CosmosError> {
        let response = self
            .document_request(Method::DELETE, id)?
            .header(HEADER_PARTITION_KEY, partition_key_header(id)?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }

    fn collection_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn feed_request(&self, method: Method) -> Result<RequestBuilder, CosmosError> {
        let link = self.collection_link();
        let url = self.resource_url(&["dbs", &self.database, "colls", &self.container, "docs"])?;
        self.signed_request(method, url, &link)
    }

    fn document_request(&self, method: Method, id: &str) -> Result<RequestBuilder, CosmosError> {
        let link = format!("{}/docs/{}", self.collection_link(), id);
        let url = self.resource_url(&[
            "dbs",
            &self.database,
            "colls",
            &self.container,
            "docs",
            id,
        ])?;
        self.signed_request(method, url, &link)
    }

    fn resource_url(&self, segments: &[&str]) -> Result<Url, CosmosError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CosmosError::InvalidEndpoint(self.endpoint.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn signed_request(
        &self,
        method: Method,
        url: Url,
        resource_link: &str,
    ) -> Result<RequestBuilder, CosmosError> {
        let date = ms_date(Utc::now());
        let token = master_key_token(&self.key, &method, "docs", resource_link, &date)?;

        Ok(self
            .http
            .request(method, url)
            .header("Authorization", token)
            .header(HEADER_DATE, date)
            .header(HEADER_VERSION, API_VERSION))
    }
}

#[derive(Debug, Deserialize)]
struct DocumentFeed<T> {
    #[serde(rename = "Documents")]
    documents: Vec<T>,
}

/// Errors produced by the Cosmos client.
#[derive(Debug, Error)]
pub enum CosmosError {
    #[error("invalid cosmos endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("master key is not valid base64: {0}")]
    InvalidKey(#[from] base64::DecodeError),
    #[error("failed to sign request")]
    Signature,
    #[error("failed to encode partition key: {0}")]
    PartitionKey(#[from] serde_json::Error),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl CosmosError {
    /// Returns `true` when the backend rejected a write because the id exists.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::CONFLICT)
    }
}

fn partition_key_header(value: &str) -> Result<String, CosmosError> {
    Ok(serde_json::to_string(&[value])?)
}

async fn ensure_success(response: Response) -> Result<(), CosmosError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(CosmosError::Status { status, body });
    }
    Ok(())
}

async fn parse_json<T>(response: Response) -> Result<T, CosmosError>
where
    T: DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<unavailable>"));
        return Err(CosmosError::Status { status, body });
    }

    Ok(response.json().await?)
}
