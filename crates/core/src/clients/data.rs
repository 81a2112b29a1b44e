use super::{ensure_success, read_json, ApiClient};
use crate::models::{AskRecord, ReviewRecord, UserProfile};
use crate::traits::ReviewStore;
use crate::ServiceError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

const REVIEWS_TABLE: &str = "reviews";
const USERS_TABLE: &str = "users";
const ASKS_TABLE: &str = "asks";

impl ApiClient {
    async fn fetch_record<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<T, ServiceError> {
        let url = Url::parse_with_params(&self.config.data_url, &[("table", table), ("id", id)])?;
        let response = self.authorize(self.client.get(url)).send().await?;
        let parsed = read_json("data", response).await?;

        match parsed.get("data") {
            Some(Value::Null) | None => Err(ServiceError::NotFound {
                table: table.to_string(),
                id: id.to_string(),
            }),
            Some(data) => Ok(serde_json::from_value(data.clone())?),
        }
    }
}

#[async_trait]
impl ReviewStore for ApiClient {
    async fn fetch_review(&self, id: &str) -> Result<ReviewRecord, ServiceError> {
        self.fetch_record(REVIEWS_TABLE, id).await
    }

    async fn fetch_user(&self, id: &str) -> Result<UserProfile, ServiceError> {
        self.fetch_record(USERS_TABLE, id).await
    }

    async fn insert_ask_record(&self, record: &AskRecord) -> Result<(), ServiceError> {
        let url = Url::parse_with_params(&self.config.data_url, &[("table", ASKS_TABLE)])?;
        let response = self
            .authorize(self.client.post(url))
            .json(record)
            .send()
            .await?;

        ensure_success("data", &response)
    }
}
