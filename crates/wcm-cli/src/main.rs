use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wcm_sync::{report_runs_markdown, MigrationConfig, MigrationPipeline, MigrationRunSummary};

#[derive(Debug, Parser)]
#[command(name = "wcm-cli")]
#[command(about = "Supplier catalog to WooCommerce migration")]
struct Cli {
    #[command(flatten)]
    paths: PathArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Overrides for `MigrationConfig::from_env`.
#[derive(Debug, Args)]
struct PathArgs {
    #[arg(long, global = true, env = "WCM_CATEGORIES_CSV")]
    categories: Option<PathBuf>,
    #[arg(long, global = true, env = "WCM_FEED_JSON")]
    feed: Option<PathBuf>,
    #[arg(long, global = true, env = "WCM_CATALOG_CSV")]
    catalog: Option<PathBuf>,
    #[arg(long, global = true, env = "WCM_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "WCM_ARTIFACTS_DIR")]
    artifacts_dir: Option<PathBuf>,
    #[arg(long, global = true, env = "WCM_IMAGE_BASE_URL")]
    image_base_url: Option<String>,
    #[arg(long, global = true, env = "WCM_RULES_DIR")]
    rules_dir: Option<PathBuf>,
}

impl PathArgs {
    fn into_config(self) -> MigrationConfig {
        let mut config = MigrationConfig::from_env();
        if let Some(path) = self.categories {
            config.categories_csv = path;
        }
        if let Some(path) = self.feed {
            config.feed_json = path;
        }
        if let Some(path) = self.catalog {
            config.catalog_csv = path;
        }
        if let Some(path) = self.output_dir {
            config.output_dir = path;
        }
        if let Some(path) = self.artifacts_dir {
            config.artifacts_dir = path;
        }
        if let Some(url) = self.image_base_url {
            config.image_base_url = url;
        }
        if let Some(path) = self.rules_dir {
            config.rules_dir = path;
        }
        config
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Full run: categories, matching, reconciliation and exports.
    Sync,
    /// Build and export the category tree only.
    Categories,
    /// Markdown digest of recent runs.
    Report {
        #[arg(long, default_value_t = 5)]
        runs: usize,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "wcm=info".into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.paths.into_config();

    match cli.command.unwrap_or(Commands::Sync) {
        Commands::Sync => {
            let summary = MigrationPipeline::from_config(config)?.run_once().await?;
            print_summary("sync", &summary);
        }
        Commands::Categories => {
            let summary = MigrationPipeline::new(config).export_categories().await?;
            print_summary("categories", &summary);
        }
        Commands::Report { runs } => {
            println!("{}", report_runs_markdown(runs, &config.output_dir)?);
        }
    }

    Ok(())
}

fn print_summary(kind: &str, summary: &MigrationRunSummary) {
    println!(
        "{kind} complete: run_id={} categories={} products={} skipped={} run_dir={}",
        summary.run_id,
        summary.categories,
        summary.feed_products,
        summary.skipped_rows(),
        summary.run_dir
    );
}
