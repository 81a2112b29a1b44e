use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum EmphasisStyle {
    Bold,
    Italic,
    BoldItalic,
    Underline,
}

impl EmphasisStyle {
    pub fn marker(self) -> &'static str {
        match self {
            Self::BoldItalic => "***",
            Self::Bold => "**",
            Self::Italic => "*",
            Self::Underline => "_",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StyledSpan {
    pub text: String,
    pub style: Option<EmphasisStyle>,
}

impl StyledSpan {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: None,
        }
    }

    pub fn styled(text: impl Into<String>, style: EmphasisStyle) -> Self {
        Self {
            text: text.into(),
            style: Some(style),
        }
    }

    /// The span as it appeared in the source markup.
    pub fn to_markup(&self) -> String {
        match self.style {
            Some(style) => format!("{marker}{}{marker}", self.text, marker = style.marker()),
            None => self.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub name_en: String,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum Language {
    #[default]
    English,
    Korean,
    Japanese,
    Chinese,
}

impl Language {
    /// Resolves a locale tag such as `ko`, `ko-KR` or `en_US`. Unknown tags map to English.
    pub fn from_locale(locale: &str) -> Self {
        let primary = locale
            .split(['-', '_'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match primary.as_str() {
            "ko" => Self::Korean,
            "ja" => Self::Japanese,
            "zh" => Self::Chinese,
            _ => Self::English,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Self::English => "en",
            Self::Korean => "ko",
            Self::Japanese => "ja",
            Self::Chinese => "zh",
        }
    }

    /// Name used when instructing the generator which language to answer in.
    pub fn english_name(self) -> &'static str {
        match self {
            Self::English => "English",
            Self::Korean => "Korean",
            Self::Japanese => "Japanese",
            Self::Chinese => "Chinese",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AskRequest {
    pub question: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchedReference {
    pub review_id: String,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AskResult {
    pub translated_question: String,
    pub embedding_vector: Vec<f32>,
    pub matched_references: Vec<MatchedReference>,
    pub answer_text: String,
    pub record_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferencedReview {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AskRecord {
    pub id: String,
    pub user_id: String,
    pub question: String,
    pub response: String,
    pub referenced_reviews: Vec<ReferencedReview>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReviewRecord {
    pub id: String,
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "locationId")]
    pub location_id: Option<String>,
    #[serde(alias = "createdAt")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMatch {
    pub id: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HydratedReview {
    pub review: ReviewRecord,
    pub score: f64,
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AskStage {
    Translate,
    Embed,
    Search,
    Hydrate,
    Generate,
    Persist,
}

impl fmt::Display for AskStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Translate => "translate",
            Self::Embed => "embed",
            Self::Search => "search",
            Self::Hydrate => "hydrate",
            Self::Generate => "generate",
            Self::Persist => "persist",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum AskPhase {
    #[default]
    Idle,
    Referencing,
    Generating,
    Done,
}

impl AskPhase {
    pub fn accepts_submission(self) -> bool {
        matches!(self, Self::Idle | Self::Done)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AskEvent {
    Submit,
    ReferencesReady,
    Completed,
    Failed,
    Reset,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AskStatus {
    pub phase: AskPhase,
    pub failed: bool,
}
