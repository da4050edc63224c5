use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anomaly_scoring::config::{ModelArgs, ScoringArgs, ServerArgs};
use anomaly_scoring::model::ModelSummary;
use anomaly_scoring::{api, ScoringService};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "anomaly-scoring")]
#[command(version)]
#[command(about = "Serve a pre-trained SVD + LOF anomaly model over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the model and serve the scoring API
    Serve {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        scoring: ScoringArgs,

        #[command(flatten)]
        server: ServerArgs,
    },

    /// Score a CSV file offline and print the JSON result
    Score {
        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        scoring: ScoringArgs,

        /// Path to CSV file
        #[arg(short, long)]
        file: PathBuf,

        /// Keep only the most anomalous rows
        #[arg(short = 'k', long)]
        top_k: Option<i64>,
    },

    /// Load the model and print its summary
    Inspect {
        #[command(flatten)]
        model: ModelArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "anomaly_scoring=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            model,
            scoring,
            server,
        } => {
            let service = load_service(&model, &scoring)?;
            let addr = server.bind_addr();
            let app = api::router(Arc::new(service), server.limits());

            let listener = tokio::net::TcpListener::bind(addr)
                .await
                .with_context(|| format!("failed to bind {}", addr))?;
            tracing::info!("anomaly-scoring v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }

        Commands::Score {
            model,
            scoring,
            file,
            top_k,
        } => {
            let service = load_service(&model, &scoring)?;
            let content =
                fs::read(&file).with_context(|| format!("failed to read {}", file.display()))?;
            let scores = service.score_csv(&content, top_k)?;
            println!("{}", serde_json::to_string_pretty(&scores)?);
        }

        Commands::Inspect { model } => {
            let bundle = model
                .load_bundle()
                .with_context(|| format!("failed to load model from {}", model.model_path.display()))?;
            print_summary(&bundle.summary());
        }
    }

    Ok(())
}

fn load_service(model: &ModelArgs, scoring: &ScoringArgs) -> anyhow::Result<ScoringService> {
    let bundle = model
        .load_bundle()
        .with_context(|| format!("failed to load model from {}", model.model_path.display()))?;

    let summary = bundle.summary();
    tracing::info!(
        shape = ?summary.shape,
        steps = ?summary.steps,
        n_features = summary.n_features,
        n_neighbors = summary.n_neighbors,
        n_train = summary.n_train,
        "model loaded"
    );

    Ok(ScoringService::new(bundle, scoring.settings()))
}

fn print_summary(summary: &ModelSummary) {
    println!("\n=== Model '{}' ===", summary.source.as_deref().unwrap_or("<memory>"));
    println!("Shape:      {:?}", summary.shape);
    println!("Steps:      {}", summary.steps.join(" -> "));
    println!("Scorer:     {}", summary.scorer);
    println!("Features:   {}", summary.n_features);
    println!("Neighbors:  {}", summary.n_neighbors);
    println!("Training:   {}", summary.n_train);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
