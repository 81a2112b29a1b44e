use super::{invalid, ApiClient};
use crate::models::SearchMatch;
use crate::traits::{EmbeddingService, Generator, Translator, VectorSearch};
use crate::ServiceError;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

#[async_trait]
impl Translator for ApiClient {
    async fn translate(
        &self,
        text: &str,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> Result<String, ServiceError> {
        let mut body = Map::new();
        body.insert("text".to_string(), json!(text));
        if let Some(source) = source_lang {
            body.insert("sourceLang".to_string(), json!(source));
        }
        body.insert("targetLang".to_string(), json!(target_lang));

        let parsed = self
            .post_json("translate", &self.config.translate_url, &Value::Object(body))
            .await?;

        parsed
            .pointer("/translatedText")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("translate", "missing translatedText"))
    }
}

#[async_trait]
impl EmbeddingService for ApiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ServiceError> {
        let parsed = self
            .post_json("embed", &self.config.embed_url, &json!({ "input": text }))
            .await?;

        let values = parsed
            .pointer("/vector")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("embed", "missing vector"))?;

        values
            .iter()
            .map(|value| {
                value
                    .as_f64()
                    .map(|number| number as f32)
                    .ok_or_else(|| invalid("embed", format!("non-numeric vector element {value}")))
            })
            .collect()
    }
}

#[async_trait]
impl VectorSearch for ApiClient {
    async fn search(&self, vector: &[f32]) -> Result<Vec<SearchMatch>, ServiceError> {
        let parsed = self
            .post_json("search", &self.config.search_url, &json!({ "vector": vector }))
            .await?;

        let hits = parsed
            .pointer("/results")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid("search", "missing results"))?;

        let mut result = Vec::with_capacity(hits.len());
        for hit in hits {
            let id = match hit.pointer("/id") {
                Some(Value::String(id)) => id.clone(),
                Some(Value::Number(id)) => id.to_string(),
                _ => return Err(invalid("search", format!("result without id: {hit}"))),
            };
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            result.push(SearchMatch { id, score });
        }

        Ok(result)
    }
}

#[async_trait]
impl Generator for ApiClient {
    async fn generate(&self, system_prompt: &str, message: &str) -> Result<String, ServiceError> {
        let parsed = self
            .post_json(
                "generate",
                &self.config.generate_url,
                &json!({
                    "systemPrompt": system_prompt,
                    "message": message,
                }),
            )
            .await?;

        parsed
            .pointer("/response")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| invalid("generate", "missing response"))
    }
}
