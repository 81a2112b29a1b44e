use crate::models::{AskEvent, AskPhase, AskStage, Language};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{service} returned status {status}")]
    Status { service: String, status: u16 },

    #[error("invalid response from {service}: {details}")]
    InvalidResponse { service: String, details: String },

    #[error("no {table} record with id {id}")]
    NotFound { table: String, id: String },
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("an ask is already in flight")]
    Busy,

    #[error("question is empty")]
    EmptyQuestion,

    #[error("cannot apply {event:?} while {from:?}")]
    InvalidTransition { from: AskPhase, event: AskEvent },

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: AskStage,
        #[source]
        source: ServiceError,
    },

    #[error("{stage} stage timed out")]
    Timeout { stage: AskStage },

    #[error("embedding service returned an empty vector")]
    EmptyEmbedding,

    #[error("embedding dimension {actual} does not match configured {expected}")]
    EmbeddingDimension { expected: usize, actual: usize },
}

impl AskError {
    pub fn stage(&self) -> Option<AskStage> {
        match self {
            Self::Stage { stage, .. } | Self::Timeout { stage } => Some(*stage),
            Self::EmptyEmbedding | Self::EmbeddingDimension { .. } => Some(AskStage::Embed),
            _ => None,
        }
    }

    /// One generic message per language. Stage details stay in the logs.
    pub fn user_message(&self, language: Language) -> &'static str {
        if matches!(self, Self::Busy) {
            return match language {
                Language::Korean => "이전 질문에 대한 답변을 준비하고 있어요. 잠시만 기다려 주세요.",
                Language::Japanese => "前の質問に回答中です。しばらくお待ちください。",
                Language::Chinese => "正在回答上一个问题，请稍候。",
                Language::English => "Still working on your previous question. Please wait a moment.",
            };
        }

        match language {
            Language::Korean => "답변을 가져오지 못했어요. 잠시 후 다시 시도해 주세요.",
            Language::Japanese => "回答を取得できませんでした。しばらくしてからもう一度お試しください。",
            Language::Chinese => "无法获取回答，请稍后再试。",
            Language::English => "Sorry, we couldn't get an answer. Please try again in a moment.",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type Result<T, E = AskError> = std::result::Result<T, E>;
