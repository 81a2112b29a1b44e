pub mod clients;
pub mod config;
pub mod error;
pub mod geo;
pub mod locations;
pub mod markup;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod traits;

pub use clients::ApiClient;
pub use config::ServiceConfig;
pub use error::{AskError, ConfigError, ServiceError};
pub use geo::{format_distance, haversine_distance, EARTH_RADIUS_METERS};
pub use locations::LocationTable;
pub use markup::{parse_markup, plain_text, render_markup};
pub use models::{
    AskEvent, AskPhase, AskRecord, AskRequest, AskResult, AskStage, AskStatus, Coordinates,
    EmphasisStyle, HydratedReview, Language, Location, MatchedReference, ReferencedReview,
    ReviewRecord, SearchMatch, StyledSpan, UserProfile,
};
pub use orchestrator::{reduce, AskPipeline, PipelineOptions};
pub use prompt::{build_system_prompt, build_user_message, PromptContext};
pub use traits::{EmbeddingService, Generator, ReviewStore, Translator, VectorSearch};
