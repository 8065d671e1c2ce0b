//! OpenFGA gateway over the HTTP API.

use crate::error::AuthzError;
use crate::gateway::{AuthorizationGateway, ModelWriter, RelationshipWriter};
use crate::types::{ObjectRef, Relationship, Subject};
use async_trait::async_trait;
use rootcause::prelude::Report;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Connection settings for one OpenFGA store.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenFgaConfig {
    /// Base URL of the OpenFGA HTTP API (e.g., "http://localhost:8080").
    pub api_url: String,
    /// The store to query.
    pub store_id: String,
    /// Pins requests to one authorization model. The latest model is used
    /// when absent.
    #[serde(default)]
    pub authorization_model_id: Option<String>,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// Connection settings for an OpenFGA server, used before any store exists.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenFgaServerConfig {
    /// Base URL of the OpenFGA HTTP API.
    pub api_url: String,
    /// Bearer token sent with every request.
    #[serde(default)]
    pub api_token: Option<String>,
}

/// An OpenFGA store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFgaStore {
    /// Store ID assigned by the server.
    pub id: String,
    /// Store name.
    pub name: String,
}

#[derive(Debug, Serialize)]
struct TupleKey<'a> {
    user: String,
    relation: &'a str,
    object: String,
}

#[derive(Debug, Serialize)]
struct CheckRequest<'a> {
    tuple_key: TupleKey<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    allowed: bool,
}

#[derive(Debug, Serialize)]
struct ListObjectsRequest<'a> {
    #[serde(rename = "type")]
    object_type: &'a str,
    relation: &'a str,
    user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ListObjectsResponse {
    objects: Vec<String>,
}

#[derive(Debug, Serialize)]
struct WriteTupleKeys<'a> {
    tuple_keys: Vec<TupleKey<'a>>,
    on_duplicate: &'static str,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a> {
    writes: WriteTupleKeys<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct WriteModelResponse {
    authorization_model_id: String,
}

#[derive(Debug, Serialize)]
struct CreateStoreRequest<'a> {
    name: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListStoresResponse {
    stores: Vec<OpenFgaStore>,
    #[serde(default)]
    continuation_token: String,
}

/// HTTP access to one OpenFGA server.
#[derive(Debug, Clone)]
struct FgaHttp {
    http: reqwest::Client,
    api_url: String,
    api_token: Option<String>,
}

impl FgaHttp {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_url.trim_end_matches('/'), path)
    }

    async fn post<B, R>(
        &self,
        path: &str,
        operation: &str,
        body: &B,
    ) -> Result<R, Report<AuthzError>>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        self.execute(self.http.post(self.url(path)).json(body), operation)
            .await
    }

    async fn get<R>(
        &self,
        path: &str,
        operation: &str,
        query: &[(&str, &str)],
    ) -> Result<R, Report<AuthzError>>
    where
        R: DeserializeOwned + Send,
    {
        self.execute(self.http.get(self.url(path)).query(query), operation)
            .await
    }

    /// Sends a request. 4xx is `Rejected`; any other failure, including a
    /// 2xx body missing required fields, is `BackendUnavailable`.
    async fn execute<R>(
        &self,
        mut request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<R, Report<AuthzError>>
    where
        R: DeserializeOwned + Send,
    {
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthzError::BackendUnavailable {
                details: format!("{operation}: {e}"),
            })?;

        let status = response.status();
        if status.is_client_error() {
            let details = response.text().await.unwrap_or_default();
            return Err(AuthzError::Rejected {
                status: status.as_u16(),
                details,
            }
            .into());
        }
        if !status.is_success() {
            return Err(AuthzError::BackendUnavailable {
                details: format!("{operation} returned {status}"),
            }
            .into());
        }

        let parsed = response
            .json::<R>()
            .await
            .map_err(|e| AuthzError::BackendUnavailable {
                details: format!("malformed {operation} response: {e}"),
            })?;
        Ok(parsed)
    }
}

fn http_client() -> Result<reqwest::Client, Report<AuthzError>> {
    let client = reqwest::Client::builder()
        .build()
        .map_err(|e| AuthzError::ConnectionFailed {
            details: e.to_string(),
        })?;
    Ok(client)
}

/// Store administration on an OpenFGA server.
#[derive(Debug, Clone)]
pub struct OpenFgaAdmin {
    http: FgaHttp,
}

impl OpenFgaAdmin {
    /// Creates an admin client for the configured server.
    pub fn new(config: OpenFgaServerConfig) -> Result<Self, Report<AuthzError>> {
        Ok(Self::with_client(http_client()?, config))
    }

    /// Creates an admin client on an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: OpenFgaServerConfig) -> Self {
        Self {
            http: FgaHttp {
                http,
                api_url: config.api_url,
                api_token: config.api_token,
            },
        }
    }

    /// Returns the store called `name`, creating it if none exists.
    #[instrument(skip(self))]
    pub async fn get_or_create_store(
        &self,
        name: &str,
    ) -> Result<OpenFgaStore, Report<AuthzError>> {
        let mut continuation_token = String::new();
        loop {
            let mut query = vec![("page_size", "100")];
            if !continuation_token.is_empty() {
                query.push(("continuation_token", continuation_token.as_str()));
            }
            let page: ListStoresResponse =
                self.http.get("stores", "list-stores", &query).await?;
            if let Some(store) = page.stores.into_iter().find(|store| store.name == name) {
                info!(store_id = %store.id, "store already exists");
                return Ok(store);
            }
            if page.continuation_token.is_empty() {
                break;
            }
            continuation_token = page.continuation_token;
        }

        let store: OpenFgaStore = self
            .http
            .post("stores", "create-store", &CreateStoreRequest { name })
            .await?;
        info!(store_id = %store.id, "store created");
        Ok(store)
    }
}

/// OpenFGA gateway for a single store.
#[derive(Debug, Clone)]
pub struct OpenFgaGateway {
    http: FgaHttp,
    config: OpenFgaConfig,
}

impl OpenFgaGateway {
    /// Creates a gateway for the configured store.
    pub fn new(config: OpenFgaConfig) -> Result<Self, Report<AuthzError>> {
        Ok(Self::with_client(http_client()?, config))
    }

    /// Creates a gateway on an existing HTTP client.
    #[must_use]
    pub fn with_client(http: reqwest::Client, config: OpenFgaConfig) -> Self {
        Self {
            http: FgaHttp {
                http,
                api_url: config.api_url.clone(),
                api_token: config.api_token.clone(),
            },
            config,
        }
    }

    fn store_path(&self, operation: &str) -> String {
        format!("stores/{}/{}", self.config.store_id, operation)
    }

    fn model_id(&self) -> Option<&str> {
        self.config.authorization_model_id.as_deref()
    }

    async fn post<B, R>(&self, operation: &str, body: &B) -> Result<R, Report<AuthzError>>
    where
        B: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        self.http
            .post(&self.store_path(operation), operation, body)
            .await
    }
}

/// Strips the `type:` prefix from a listed object, checking the type matches.
fn listed_object_id(object_type: &str, listed: &str) -> Result<String, Report<AuthzError>> {
    let object: ObjectRef = listed.parse().map_err(|_| AuthzError::BackendUnavailable {
        details: format!("malformed object '{listed}' in list-objects response"),
    })?;
    if object.object_type != object_type {
        return Err(AuthzError::BackendUnavailable {
            details: format!("list-objects for type '{object_type}' returned '{listed}'"),
        }
        .into());
    }
    Ok(object.id)
}

fn write_request<'a>(
    relationship: &'a Relationship,
    authorization_model_id: Option<&'a str>,
) -> WriteRequest<'a> {
    WriteRequest {
        writes: WriteTupleKeys {
            tuple_keys: vec![TupleKey {
                user: relationship.subject.to_string(),
                relation: &relationship.relation,
                object: relationship.object.to_string(),
            }],
            on_duplicate: "ignore",
        },
        authorization_model_id,
    }
}

#[async_trait]
impl AuthorizationGateway for OpenFgaGateway {
    #[instrument(skip(self), fields(store = %self.config.store_id, subject = %subject, object = %object))]
    async fn check(
        &self,
        subject: &Subject,
        relation: &str,
        object: &ObjectRef,
    ) -> Result<bool, Report<AuthzError>> {
        let body = CheckRequest {
            tuple_key: TupleKey {
                user: subject.to_string(),
                relation,
                object: object.to_string(),
            },
            authorization_model_id: self.model_id(),
        };

        let response: CheckResponse = self.post("check", &body).await?;
        debug!(allowed = response.allowed, "check result");
        Ok(response.allowed)
    }

    #[instrument(skip(self), fields(store = %self.config.store_id, subject = %subject))]
    async fn list_objects(
        &self,
        subject: &Subject,
        relation: &str,
        object_type: &str,
    ) -> Result<Vec<String>, Report<AuthzError>> {
        let body = ListObjectsRequest {
            object_type,
            relation,
            user: subject.to_string(),
            authorization_model_id: self.model_id(),
        };

        let response: ListObjectsResponse = self.post("list-objects", &body).await?;
        let ids = response
            .objects
            .iter()
            .map(|listed| listed_object_id(object_type, listed))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = ids.len(), "list objects result");
        Ok(ids)
    }
}

#[async_trait]
impl RelationshipWriter for OpenFgaGateway {
    #[instrument(skip(self), fields(store = %self.config.store_id, relationship = %relationship))]
    async fn write_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<(), Report<AuthzError>> {
        let body = write_request(relationship, self.model_id());
        let _: serde_json::Value = self.post("write", &body).await?;
        debug!("relationship written");
        Ok(())
    }
}

#[async_trait]
impl ModelWriter for OpenFgaGateway {
    /// Writes a JSON authorization model and returns its model ID.
    #[instrument(skip(self, model), fields(store = %self.config.store_id))]
    async fn write_model(&self, model: &str) -> Result<Option<String>, Report<AuthzError>> {
        let model: serde_json::Value =
            serde_json::from_str(model).map_err(|e| AuthzError::InvalidInput {
                details: format!("authorization model is not JSON: {e}"),
            })?;

        let response: WriteModelResponse = self.post("authorization-models", &model).await?;
        info!(
            authorization_model_id = %response.authorization_model_id,
            "authorization model written"
        );
        Ok(Some(response.authorization_model_id))
    }
}
