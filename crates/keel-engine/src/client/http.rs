//! HTTP vendor client.
//!
//! Endpoints, relative to the configured base URL:
//!
//! | Call       | Request                          | Success body            |
//! |------------|----------------------------------|-------------------------|
//! | `create`   | `POST /v1/{type}`                | `{"id": "..."}`         |
//! | `read`     | `GET /v1/{type}/{id}`            | the remote object       |
//! | `update`   | `PATCH /v1/{type}/{id}`          | ignored                 |
//! | `delete`   | `DELETE /v1/{type}/{id}`         | ignored                 |
//! | `describe` | `GET /v1/{type}/{id}/status`     | `{"state", "payload"}`  |

use std::time::Duration;

use async_trait::async_trait;
use keel_core::ResourceId;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{JsonMap, PollResult, VendorClient};
use crate::error::{ClientError, ClientResult};

/// HTTP client for the vendor API.
#[derive(Debug, Clone)]
pub struct HttpVendorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVendorClient {
    /// Create a new vendor client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - The base URL of the vendor API (e.g., "https://vendor.example.com")
    /// * `timeout` - Per-request timeout
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Network` if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, base_url))
    }

    /// Create a new vendor client with a custom reqwest client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Get the base URL of the vendor API.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, resource_type: &str) -> String {
        format!("{}/v1/{resource_type}", self.base_url)
    }

    fn object_url(&self, resource_type: &str, id: &ResourceId) -> String {
        format!("{}/v1/{resource_type}/{id}", self.base_url)
    }
}

/// Success body of a create call.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// Error response from the vendor.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(alias = "message")]
    error: String,
}

fn transport_error(e: &reqwest::Error) -> ClientError {
    if e.is_decode() {
        ClientError::InvalidResponse(e.to_string())
    } else {
        ClientError::Network(e.to_string())
    }
}

/// Map a non-success response to a `ClientError`.
async fn error_from_response(response: reqwest::Response) -> ClientError {
    let status = response.status();
    let message = response
        .json::<ErrorResponse>()
        .await
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("vendor returned status {status}"));

    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(message),
        StatusCode::CONFLICT => ClientError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS
        | StatusCode::BAD_GATEWAY
        | StatusCode::SERVICE_UNAVAILABLE
        | StatusCode::GATEWAY_TIMEOUT => ClientError::Throttled(message),
        _ => ClientError::Rejected {
            status: status.as_u16(),
            message,
        },
    }
}

async fn send(request: reqwest::RequestBuilder) -> ClientResult<reqwest::Response> {
    let response = request.send().await.map_err(|e| transport_error(&e))?;
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(error_from_response(response).await)
    }
}

#[async_trait]
impl VendorClient for HttpVendorClient {
    async fn create(&self, resource_type: &str, request: &JsonMap) -> ClientResult<ResourceId> {
        let url = self.collection_url(resource_type);
        let response = send(self.client.post(&url).json(request))
            .await
            .inspect_err(|e| {
                tracing::error!(resource_type, error = %e, "Create request failed");
            })?;

        let body: CreateResponse = response.json().await.map_err(|e| transport_error(&e))?;
        let id = ResourceId::new(body.id)
            .map_err(|e| ClientError::InvalidResponse(format!("bad identity: {e}")))?;

        tracing::debug!(resource_type, id = %id, "Submitted create");
        Ok(id)
    }

    async fn read(&self, resource_type: &str, id: &ResourceId) -> ClientResult<serde_json::Value> {
        let url = self.object_url(resource_type, id);
        let response = send(self.client.get(&url)).await?;
        response.json().await.map_err(|e| transport_error(&e))
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &ResourceId,
        request: &JsonMap,
    ) -> ClientResult<()> {
        let url = self.object_url(resource_type, id);
        send(self.client.patch(&url).json(request))
            .await
            .inspect_err(|e| {
                tracing::error!(resource_type, id = %id, error = %e, "Update request failed");
            })?;

        tracing::debug!(resource_type, id = %id, "Submitted update");
        Ok(())
    }

    async fn delete(&self, resource_type: &str, id: &ResourceId) -> ClientResult<()> {
        let url = self.object_url(resource_type, id);
        send(self.client.delete(&url)).await?;
        tracing::debug!(resource_type, id = %id, "Submitted delete");
        Ok(())
    }

    async fn describe(&self, resource_type: &str, id: &ResourceId) -> ClientResult<PollResult> {
        let url = format!("{}/status", self.object_url(resource_type, id));
        let response = send(self.client.get(&url)).await?;
        response.json().await.map_err(|e| transport_error(&e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpVendorClient {
        HttpVendorClient::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn id(value: &str) -> ResourceId {
        ResourceId::new(value).unwrap()
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let client =
            HttpVendorClient::new("http://localhost:8080/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn create_posts_request_and_returns_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/search_domain"))
            .and(body_json(json!({"DomainName": "logs"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "logs"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = JsonMap::new();
        request.insert("DomainName".into(), json!("logs"));
        let id = client(&server)
            .create("search_domain", &request)
            .await
            .unwrap();
        assert_eq!(id.as_str(), "logs");
    }

    #[tokio::test]
    async fn create_rejects_empty_identity() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": ""})))
            .mount(&server)
            .await;

        let err = client(&server)
            .create("search_domain", &JsonMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn read_returns_object() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/model_endpoint/ep-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"EndpointName": "ep-1"})),
            )
            .mount(&server)
            .await;

        let body = client(&server)
            .read("model_endpoint", &id("ep-1"))
            .await
            .unwrap();
        assert_eq!(body, json!({"EndpointName": "ep-1"}));
    }

    #[tokio::test]
    async fn describe_parses_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/model_endpoint/ep-1/status"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"state": "Creating"})),
            )
            .mount(&server)
            .await;

        let status = client(&server)
            .describe("model_endpoint", &id("ep-1"))
            .await
            .unwrap();
        assert_eq!(status, PollResult::new("Creating"));
    }

    #[tokio::test]
    async fn update_patches_object() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/web_acl/acl-1"))
            .and(body_json(json!({"DefaultAction": {"Type": "BLOCK"}})))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut request = JsonMap::new();
        request.insert("DefaultAction".into(), json!({"Type": "BLOCK"}));
        client(&server)
            .update("web_acl", &id("acl-1"), &request)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/web_acl/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"error": "no such acl"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/web_acl/busy"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/web_acl/slow"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/v1/web_acl/bad"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "malformed"})),
            )
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(
            client.delete("web_acl", &id("missing")).await,
            Err(ClientError::NotFound("no such acl".into()))
        );
        assert!(matches!(
            client.delete("web_acl", &id("busy")).await,
            Err(ClientError::Conflict(_))
        ));
        let throttled = client.delete("web_acl", &id("slow")).await.unwrap_err();
        assert!(throttled.is_transient());
        assert_eq!(
            client.delete("web_acl", &id("bad")).await,
            Err(ClientError::Rejected {
                status: 400,
                message: "malformed".into()
            })
        );
    }

    #[tokio::test]
    async fn unreachable_vendor_is_network_error() {
        let client = HttpVendorClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap();
        let err = client
            .describe("web_acl", &id("acl-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
    }
}
