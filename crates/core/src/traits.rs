use crate::models::{AskRecord, ReviewRecord, SearchMatch, UserProfile};
use crate::ServiceError;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Translator {
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError>;
}

#[async_trait]
pub trait VectorSearch {
    /// Matches in descending relevance, as ranked by the search service.
    async fn search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>, ServiceError>;
}

#[async_trait]
pub trait ReviewStore {
    async fn fetch_review(&self, id: &str) -> Result<ReviewRecord, ServiceError>;

    async fn fetch_user(&self, id: &str) -> Result<UserProfile, ServiceError>;

    async fn insert_ask_record(&self, record: &AskRecord) -> Result<(), ServiceError>;
}

#[async_trait]
pub trait Generator {
    async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, ServiceError>;
}

#[async_trait]
impl<T: Translator + Send + Sync + ?Sized> Translator for Arc<T> {
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<String, ServiceError> {
        (**self).translate(text, source_lang, target_lang).await
    }
}

#[async_trait]
impl<T: EmbeddingService + Send + Sync + ?Sized> EmbeddingService for Arc<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        (**self).embed(text).await
    }
}

#[async_trait]
impl<T: VectorSearch + Send + Sync + ?Sized> VectorSearch for Arc<T> {
    async fn search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>, ServiceError> {
        (**self).search(vector).await
    }
}

#[async_trait]
impl<T: ReviewStore + Send + Sync + ?Sized> ReviewStore for Arc<T> {
    async fn fetch_review(&self, id: &str) -> Result<ReviewRecord, ServiceError> {
        (**self).fetch_review(id).await
    }

    async fn fetch_user(&self, id: &str) -> Result<UserProfile, ServiceError> {
        (**self).fetch_user(id).await
    }

    async fn insert_ask_record(&self, record: &AskRecord) -> Result<(), ServiceError> {
        (**self).insert_ask_record(record).await
    }
}

#[async_trait]
impl<T: Generator + Send + Sync + ?Sized> Generator for Arc<T> {
    async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, ServiceError> {
        (**self).generate(system_prompt, message).await
    }
}
