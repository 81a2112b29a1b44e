use campus_ask_core::{
    format_distance, haversine_distance, parse_markup, ApiClient, AskPipeline, AskRequest,
    Coordinates, Language, LocationTable, PipelineOptions, ServiceConfig,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "campus-ask", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML file with service endpoints and limits
    #[arg(long, env = "CAMPUS_ASK_CONFIG")]
    config: Option<PathBuf>,

    /// Translation endpoint
    #[arg(long, env = "CAMPUS_ASK_TRANSLATE_URL")]
    translate_url: Option<String>,

    /// Embedding endpoint
    #[arg(long, env = "CAMPUS_ASK_EMBED_URL")]
    embed_url: Option<String>,

    /// Vector search endpoint
    #[arg(long, env = "CAMPUS_ASK_SEARCH_URL")]
    search_url: Option<String>,

    /// Data endpoint for reviews, users and ask records
    #[arg(long, env = "CAMPUS_ASK_DATA_URL")]
    data_url: Option<String>,

    /// Generation endpoint
    #[arg(long, env = "CAMPUS_ASK_GENERATE_URL")]
    generate_url: Option<String>,

    /// Bearer token sent to every endpoint
    #[arg(long, env = "CAMPUS_ASK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Per-stage timeout in seconds
    #[arg(long, env = "CAMPUS_ASK_STAGE_TIMEOUT_SECS")]
    stage_timeout_secs: Option<u64>,

    /// JSON file with the campus location table
    #[arg(long, env = "CAMPUS_ASK_LOCATIONS")]
    locations: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Answer a question from campus reviews and store the interaction.
    Ask {
        /// Question as the user typed it
        #[arg(long)]
        question: String,
        /// Id of the asking user
        #[arg(long)]
        user_id: String,
        /// Locale of the question and the answer
        #[arg(long, default_value = "en")]
        locale: String,
        /// User latitude, enables distance hints
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        /// User longitude
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Print the styled spans of an inline-markup string.
    Render {
        #[arg(long)]
        text: String,
    },
    /// Great-circle distance between two points.
    Distance {
        #[arg(long, allow_hyphen_values = true)]
        from_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        from_lon: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        to_lon: f64,
    },
}

impl Cli {
    fn service_config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = match &self.config {
            Some(path) => ServiceConfig::load(path)?,
            None => ServiceConfig::default(),
        };

        let overrides = [
            (&self.translate_url, &mut config.translate_url),
            (&self.embed_url, &mut config.embed_url),
            (&self.search_url, &mut config.search_url),
            (&self.data_url, &mut config.data_url),
            (&self.generate_url, &mut config.generate_url),
        ];
        for (flag, target) in overrides {
            if let Some(value) = flag {
                *target = value.clone();
            }
        }

        if self.api_key.is_some() {
            config.api_key = self.api_key.clone();
        }
        if let Some(secs) = self.stage_timeout_secs {
            config.stage_timeout_secs = secs;
        }
        if self.locations.is_some() {
            config.locations_file = self.locations.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "campus-ask boot"
    );

    match &cli.command {
        Command::Ask {
            question,
            user_id,
            locale,
            lat,
            lon,
        } => {
            let config = cli.service_config()?;
            let locations = match &config.locations_file {
                Some(path) => LocationTable::from_file(path)?,
                None => {
                    warn!("no location table configured, location names will be unknown");
                    LocationTable::default()
                }
            };
            info!(locations = locations.len(), data_url = %config.data_url, "services configured");

            let api = Arc::new(ApiClient::new(config.clone())?);
            let pipeline = AskPipeline::new(
                api.clone(),
                api.clone(),
                api.clone(),
                api.clone(),
                api,
                locations,
                PipelineOptions::from(&config),
            );

            let request = AskRequest {
                question: question.clone(),
                user_id: user_id.clone(),
            };
            let user_coordinates = (*lat).zip(*lon).map(|(lat, lon)| Coordinates::new(lat, lon));

            match pipeline.run_ask(&request, locale, user_coordinates).await {
                Ok(result) => {
                    println!("{}", result.answer_text);
                    if !result.matched_references.is_empty() {
                        println!();
                        for reference in &result.matched_references {
                            println!(
                                "reference review_id={} score={:.3}",
                                reference.review_id, reference.relevance_score
                            );
                        }
                    }
                    match result.record_id {
                        Some(id) => println!("record_id={id}"),
                        None => println!("record_id=<not stored>"),
                    }
                }
                Err(error) => {
                    eprintln!("{}", error.user_message(Language::from_locale(locale)));
                    return Err(error.into());
                }
            }
        }
        Command::Render { text } => {
            for span in parse_markup(text) {
                let style = span
                    .style
                    .map(|style| format!("{style:?}"))
                    .unwrap_or_else(|| "Plain".to_string());
                println!("[{style}] {:?}", span.text);
            }
        }
        Command::Distance {
            from_lat,
            from_lon,
            to_lat,
            to_lon,
        } => {
            let meters = haversine_distance(
                Coordinates::new(*from_lat, *from_lon),
                Coordinates::new(*to_lat, *to_lon),
            );
            println!("{meters:.1} m ({})", format_distance(meters));
        }
    }

    Ok(())
}
