//! newtons-lens: analyze photos of science experiments.
//!
//! Usage:
//!   newtons-lens                                  # serve HTTP (default)
//!   newtons-lens serve
//!   newtons-lens analyze photo.jpg --type circuits
//!   newtons-lens demo

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use newtons_lens::clients::create_vision_model;
use newtons_lens::config::{self, Config};
use newtons_lens::http::{AppState, start_http_server};
use newtons_lens::image::{DEFAULT_MIME_TYPE, ImagePayload, mime_for_extension};
use newtons_lens::report::{render_report, render_summary};
use newtons_lens::schemas::ExperimentDomain;
use newtons_lens::sessions::{SessionStore, SqliteSessionStore};
use newtons_lens::{ExperimentAnalyzer, fallback};

#[derive(Parser)]
#[command(name = "newtons-lens")]
#[command(about = "AI lab partner for hands-on science experiments", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve,
    /// Analyze a single image file and print the report
    Analyze {
        /// Path to a JPEG/PNG/WebP photo of the experiment
        image: PathBuf,
        /// Experiment type: circuits, chemistry, physics or general
        #[arg(short = 't', long = "type", default_value = "general")]
        experiment_type: String,
        /// Also write the analysis as JSON to this path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the built-in fallback analysis for circuits, chemistry and physics
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // tracing first so config loading can log
    config::load_env_file();
    tracing_subscriber::fmt()
        .with_env_filter(config::log_filter(|key| std::env::var(key).ok()))
        .init();

    let config = Config::load()?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Analyze {
            image,
            experiment_type,
            output,
        } => analyze_file(&config, &image, &experiment_type, output.as_deref()).await,
        Commands::Demo => {
            demo();
            Ok(())
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting newtons-lens v{}", env!("CARGO_PKG_VERSION"));

    let model = create_vision_model(&config);
    info!("Vision model: {}", model.name());

    let store: Arc<dyn SessionStore> = Arc::new(
        SqliteSessionStore::from_config(&config.storage)
            .context("Failed to open session database")?,
    );
    info!("Session database: {}", config.storage.database_path);

    let state = AppState::new(ExperimentAnalyzer::new(model), store);
    start_http_server(&config, state).await?;
    Ok(())
}

async fn analyze_file(
    config: &Config,
    path: &std::path::Path,
    experiment_type: &str,
    output: Option<&std::path::Path>,
) -> Result<()> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))?;
    let mime = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(mime_for_extension)
        .unwrap_or(DEFAULT_MIME_TYPE);
    let image_data = ImagePayload::new(bytes, mime).to_data_url();

    let analyzer = ExperimentAnalyzer::new(create_vision_model(config));
    let analysis = analyzer.analyze_with_source(&image_data, experiment_type).await;
    info!("Analysis source: {}", analysis.source);

    println!("{}", render_report(&analysis.result));

    if let Some(output) = output {
        let json = serde_json::to_string_pretty(&analysis.result)?;
        tokio::fs::write(output, json)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("Results saved to {}", output.display());
    }
    Ok(())
}

fn demo() {
    for domain in [
        ExperimentDomain::Circuits,
        ExperimentDomain::Chemistry,
        ExperimentDomain::Physics,
    ] {
        let result = fallback::generate(domain);
        println!("{}", render_summary(domain.as_str(), &result));
        println!("{}", render_report(&result));
    }
}
