pub mod data;
pub mod inference;

use crate::config::ServiceConfig;
use crate::ServiceError;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;

/// HTTP client for the campus API. One instance serves every collaborator trait.
pub struct ApiClient {
    client: Client,
    config: ServiceConfig,
}

impl ApiClient {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder().timeout(config.stage_timeout()).build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn post_json(&self, service: &str, url: &str, body: &Value) -> Result<Value, ServiceError> {
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;

        read_json(service, response).await
    }
}

fn ensure_success(service: &str, response: &Response) -> Result<(), ServiceError> {
    if response.status().is_success() {
        return Ok(());
    }

    Err(ServiceError::Status {
        service: service.to_string(),
        status: response.status().as_u16(),
    })
}

async fn read_json(service: &str, response: Response) -> Result<Value, ServiceError> {
    ensure_success(service, &response)?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn invalid(service: &str, details: impl Into<String>) -> ServiceError {
    ServiceError::InvalidResponse {
        service: service.to_string(),
        details: details.into(),
    }
}
