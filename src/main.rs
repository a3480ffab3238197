use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use epf_workbench::{acquisition, config, pipeline, store, telemetry};
use config::{Config, Layout};
use epf_workbench::ml::ModelSpec;
use epf_workbench::preprocess::ScaleMethod;
use telemetry::init_tracing;
use tracing::info;

#[derive(Parser)]
#[command(name = "epf")]
#[command(about = "Day-ahead electricity price forecasting workbench")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "config/default.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the market dataset and reference forecasts
    Acquire,
    /// Build the feature store from the acquired CSV files
    BuildStore,
    /// Fit and evaluate one model on the feature store
    Run {
        /// Model family (nn, knn, lasso, elastic, svr, adaboost, gradientboost, lightgbm)
        #[arg(long)]
        model: Option<ModelSpec>,
        /// Scaler (minmax or meanstd)
        #[arg(long)]
        scaler: Option<ScaleMethod>,
        /// Target layout (wide or long)
        #[arg(long)]
        layout: Option<Layout>,
        /// Trim outlier rows from the training set
        #[arg(long)]
        remove_outliers: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let cfg = Config::load_from(&cli.config)?;

    match cli.command {
        Commands::Acquire => {
            let files = acquisition::acquire(&cfg.acquisition).await?;
            info!(?files, "acquisition finished");
        }
        Commands::BuildStore => {
            let summary = tokio::task::spawn_blocking(move || {
                store::features::build_store(&cfg.acquisition, &cfg.store)
            })
            .await
            .context("feature store task panicked")??;
            println!(
                "train samples: {}, test samples: {}, features: {}",
                summary.train_samples, summary.test_samples, summary.features
            );
        }
        Commands::Run {
            model,
            scaler,
            layout,
            remove_outliers,
        } => {
            let mut pipeline_cfg = cfg.pipeline;
            if let Some(model) = model {
                pipeline_cfg.model = model;
            }
            if let Some(scaler) = scaler {
                pipeline_cfg.scaler = scaler;
            }
            if let Some(layout) = layout {
                pipeline_cfg.layout = layout;
            }
            pipeline_cfg.remove_outliers |= remove_outliers;

            let feature_store = store::FeatureStore::open(cfg.store.path);
            let report = tokio::task::spawn_blocking(move || {
                pipeline::run(&pipeline_cfg, &feature_store)
            })
            .await
            .context("pipeline task panicked")??;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
