//! Migration pipeline orchestration: load, build, match, reconcile, export.

pub mod enrich;
pub mod export;
pub mod matcher;
pub mod reconcile;
pub mod snapshots;
pub mod tree;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wcm_adapters::{CatalogCsvLoader, CategoryTableLoader, SkippedRow, SourceLoader, SupplierFeedLoader};
use wcm_core::{Category, ComparisonStats};
use wcm_storage::{describe_export, write_atomic, ArtifactStore, ExportedFile};

use crate::enrich::{EnrichmentHook, NoopEnrichmentHook, StagedProduct, YamlRuleEnrichmentHook};
use crate::export::WooProductRow;
use crate::matcher::CategoryIndex;
use crate::reconcile::{Reconciler, Reconciliation};
use crate::tree::{build_category_tree, unique_paths};

pub const CRATE_NAME: &str = "wcm-sync";

pub const RUN_SUMMARY_JSON: &str = "run_summary.json";
pub const RUN_SUMMARY_MD: &str = "run_summary.md";

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub categories_csv: PathBuf,
    pub feed_json: PathBuf,
    pub catalog_csv: PathBuf,
    pub output_dir: PathBuf,
    pub artifacts_dir: PathBuf,
    pub image_base_url: String,
    pub rules_dir: PathBuf,
}

impl MigrationConfig {
    pub fn from_env() -> Self {
        let path_var = |name: &str, default: &str| {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };
        Self {
            categories_csv: path_var("WCM_CATEGORIES_CSV", "./fixtures/sample/categorias.csv"),
            feed_json: path_var("WCM_FEED_JSON", "./fixtures/sample/feed.json"),
            catalog_csv: path_var("WCM_CATALOG_CSV", "./fixtures/sample/catalog.csv"),
            output_dir: path_var("WCM_OUTPUT_DIR", "./output"),
            artifacts_dir: path_var("WCM_ARTIFACTS_DIR", "./artifacts"),
            image_base_url: std::env::var("WCM_IMAGE_BASE_URL").unwrap_or_default(),
            rules_dir: path_var("WCM_RULES_DIR", "./rules"),
        }
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.output_dir.join("runs")
    }
}

/// Per-input bookkeeping for the run summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    pub source_id: String,
    pub path: String,
    pub records: usize,
    pub skipped: Vec<SkippedRow>,
    pub sha256: String,
    pub archived_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: usize,
    pub feed_products: usize,
    pub catalog_products: usize,
    pub sources: Vec<SourceReport>,
    pub stats: Option<ComparisonStats>,
    pub run_dir: String,
    pub exports: Vec<ExportedFile>,
    pub parquet_manifest: Option<String>,
}

impl MigrationRunSummary {
    pub fn skipped_rows(&self) -> usize {
        self.sources.iter().map(|s| s.skipped.len()).sum()
    }

    pub fn to_markdown(&self) -> String {
        let mut lines = vec![
            "# Catalog Migration Run".to_string(),
            String::new(),
            format!("- Run ID: `{}`", self.run_id),
            format!("- Started: {}", self.started_at),
            format!("- Finished: {}", self.finished_at),
            format!("- Categories: {}", self.categories),
            format!("- Feed products: {}", self.feed_products),
            format!("- Catalog products: {}", self.catalog_products),
            String::new(),
            "## Sources".to_string(),
        ];
        for source in &self.sources {
            lines.push(format!(
                "- {}: {} records, {} skipped (`{}`)",
                source.source_id,
                source.records,
                source.skipped.len(),
                source.path
            ));
        }
        if let Some(stats) = &self.stats {
            lines.push(String::new());
            lines.push("## Reconciliation".to_string());
            lines.extend(stats_lines(stats));
        }
        lines.push(String::new());
        lines.push("## Exports".to_string());
        for file in &self.exports {
            lines.push(format!("- `{}` ({} bytes, sha256 `{}`)", file.path, file.bytes, file.sha256));
        }
        if let Some(manifest) = &self.parquet_manifest {
            lines.push(format!("- parquet manifest: `{manifest}`"));
        }
        lines.push(String::new());
        lines.join("\n")
    }
}

fn stats_lines(stats: &ComparisonStats) -> Vec<String> {
    vec![
        format!("- Total products: {}", stats.total_products),
        format!("- In both sources: {}", stats.in_both_sources),
        format!("- Only in feed: {}", stats.only_in_feed),
        format!("- Only in catalog: {}", stats.only_in_catalog),
        format!("- High match score (> 0.8): {}", stats.high_match_score),
        format!("- High category confidence (> 0.8): {}", stats.high_category_confidence),
    ]
}

pub struct MigrationPipeline {
    config: MigrationConfig,
    artifact_store: ArtifactStore,
    reconciler: Reconciler,
    enrichment: Box<dyn EnrichmentHook>,
}

impl MigrationPipeline {
    pub fn new(config: MigrationConfig) -> Self {
        let artifact_store = ArtifactStore::new(config.artifacts_dir.clone());
        Self {
            config,
            artifact_store,
            reconciler: Reconciler::default(),
            enrichment: Box::<NoopEnrichmentHook>::default(),
        }
    }

    /// Pipeline with the YAML rules from `config.rules_dir` when that
    /// directory exists.
    pub fn from_config(config: MigrationConfig) -> Result<Self> {
        if !config.rules_dir.is_dir() {
            warn!(
                rules_dir = %config.rules_dir.display(),
                "rules directory not found; products are exported without keyword tags or title translation"
            );
            return Ok(Self::new(config));
        }
        let hook = YamlRuleEnrichmentHook::from_rules_dir(&config.rules_dir)?;
        Ok(Self::new(config).with_enrichment(Box::new(hook)))
    }

    pub fn with_enrichment(mut self, enrichment: Box<dyn EnrichmentHook>) -> Self {
        self.enrichment = enrichment;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub async fn run_once(&self) -> Result<MigrationRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting catalog migration run");

        let (paths, category_source) = self
            .ingest(CategoryTableLoader, &self.config.categories_csv, started_at)
            .await?;
        let (feed, feed_source) = self
            .ingest(SupplierFeedLoader, &self.config.feed_json, started_at)
            .await?;
        let (catalog, catalog_source) = self
            .ingest(CatalogCsvLoader, &self.config.catalog_csv, started_at)
            .await?;

        let paths = unique_paths(paths);
        let tree = build_category_tree(&paths);
        let index = CategoryIndex::new(&paths);
        info!(paths = paths.len(), categories = tree.len(), "category tree built");

        let matches: Vec<_> = feed.iter().map(|product| index.match_product(product)).collect();
        let unmatched = matches
            .iter()
            .filter(|m| m.as_ref().map_or(true, |m| m.confidence <= 0.0))
            .count();
        info!(products = feed.len(), unmatched, "products matched to categories");

        let Reconciliation { rows, stats } = self.reconciler.reconcile(&feed, &catalog, &matches);
        for row in rows.iter().filter(|r| r.nearest_catalog_name.is_some()) {
            debug!(
                product = %row.product_name,
                nearest = row.nearest_catalog_name.as_deref().unwrap_or_default(),
                "no exact catalog counterpart; near miss found"
            );
        }

        let feed_products = feed.len();
        let staged: Vec<StagedProduct> = feed
            .into_iter()
            .zip(matches)
            .map(|(product, category)| StagedProduct::new(product, category))
            .collect();
        let staged = self.enrichment.apply(staged)?;
        let product_rows: Vec<WooProductRow> = staged
            .iter()
            .map(|item| WooProductRow::from_staged(item, &self.config.image_base_url))
            .collect();

        let run_dir = self.create_run_dir(run_id).await?;
        let mut exports = self.write_category_exports(&run_dir, tree.categories()).await?;
        for (name, bytes) in [
            (export::PRODUCTS_CSV, export::products_csv(&product_rows)?),
            (export::COMPARISON_CSV, export::comparison_csv(&rows)?),
            (export::STATS_JSON, export::stats_json(&stats)?),
        ] {
            exports.push(write_export(&run_dir, name, &bytes).await?);
        }

        let manifest_path =
            snapshots::export_parquet_snapshots(&run_dir, tree.categories(), &rows).await?;

        let summary = MigrationRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            categories: tree.len(),
            feed_products,
            catalog_products: catalog.len(),
            sources: vec![category_source, feed_source, catalog_source],
            stats: Some(stats),
            run_dir: run_dir.display().to_string(),
            exports,
            parquet_manifest: Some(manifest_path.display().to_string()),
        };
        self.write_summary(&run_dir, &summary).await?;
        info!(
            %run_id,
            in_both_sources = stats.in_both_sources,
            only_in_feed = stats.only_in_feed,
            only_in_catalog = stats.only_in_catalog,
            skipped_rows = summary.skipped_rows(),
            run_dir = %run_dir.display(),
            "catalog migration run finished"
        );
        Ok(summary)
    }

    /// Builds and exports the category tree without touching products.
    pub async fn export_categories(&self) -> Result<MigrationRunSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, "starting category export");

        let (paths, category_source) = self
            .ingest(CategoryTableLoader, &self.config.categories_csv, started_at)
            .await?;
        let tree = build_category_tree(&unique_paths(paths));

        let run_dir = self.create_run_dir(run_id).await?;
        let exports = self.write_category_exports(&run_dir, tree.categories()).await?;
        let summary = MigrationRunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            categories: tree.len(),
            feed_products: 0,
            catalog_products: 0,
            sources: vec![category_source],
            stats: None,
            run_dir: run_dir.display().to_string(),
            exports,
            parquet_manifest: None,
        };
        self.write_summary(&run_dir, &summary).await?;
        info!(%run_id, categories = tree.len(), run_dir = %run_dir.display(), "category export finished");
        Ok(summary)
    }

    /// Parses one input, logs its skipped rows and archives its raw bytes.
    async fn ingest<L: SourceLoader>(
        &self,
        loader: L,
        path: &Path,
        loaded_at: DateTime<Utc>,
    ) -> Result<(Vec<L::Record>, SourceReport)> {
        let source_id = loader.source_id();
        let (raw, loaded) = loader
            .load(path)
            .with_context(|| format!("loading {source_id} from {}", path.display()))?;
        for skipped in &loaded.skipped {
            warn!(source_id, row = skipped.row, reason = %skipped.reason, "skipped input row");
        }
        let stored = self
            .artifact_store
            .store_bytes(loaded_at, source_id, raw.format.extension(), &raw.bytes)
            .await
            .with_context(|| format!("archiving {source_id} input"))?;
        info!(
            source_id,
            records = loaded.records.len(),
            skipped = loaded.skipped.len(),
            "loaded source"
        );
        let report = SourceReport {
            source_id: source_id.to_string(),
            path: path.display().to_string(),
            records: loaded.records.len(),
            skipped: loaded.skipped,
            sha256: stored.content_hash,
            archived_at: stored.absolute_path.display().to_string(),
        };
        Ok((loaded.records, report))
    }

    async fn create_run_dir(&self, run_id: Uuid) -> Result<PathBuf> {
        let run_dir = self.config.runs_dir().join(run_id.to_string());
        tokio::fs::create_dir_all(&run_dir)
            .await
            .with_context(|| format!("creating {}", run_dir.display()))?;
        Ok(run_dir)
    }

    async fn write_category_exports(
        &self,
        run_dir: &Path,
        categories: &[Category],
    ) -> Result<Vec<ExportedFile>> {
        Ok(vec![
            write_export(run_dir, export::CATEGORIES_CSV, &export::categories_csv(categories)?).await?,
            write_export(
                run_dir,
                export::CATEGORY_MAPPING_JSON,
                &export::category_mapping_json(categories)?,
            )
            .await?,
        ])
    }

    async fn write_summary(&self, run_dir: &Path, summary: &MigrationRunSummary) -> Result<()> {
        let json = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
        write_atomic(&run_dir.join(RUN_SUMMARY_JSON), &json).await?;
        write_atomic(&run_dir.join(RUN_SUMMARY_MD), summary.to_markdown().as_bytes()).await?;
        Ok(())
    }
}

async fn write_export(run_dir: &Path, name: &str, bytes: &[u8]) -> Result<ExportedFile> {
    let path = run_dir.join(name);
    write_atomic(&path, bytes).await?;
    debug!(file = name, bytes = bytes.len(), "wrote export");
    describe_export(name, run_dir, &path).await
}

pub async fn run_migration_once_from_env() -> Result<MigrationRunSummary> {
    MigrationPipeline::from_config(MigrationConfig::from_env())?
        .run_once()
        .await
}

/// Markdown digest of the `runs` most recent runs under `output_dir`.
pub fn report_runs_markdown(runs: usize, output_dir: &Path) -> Result<String> {
    let runs_root = output_dir.join("runs");
    let mut summaries = Vec::new();
    for entry in std::fs::read_dir(&runs_root)
        .with_context(|| format!("reading {}", runs_root.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
    {
        let summary_path = entry.path().join(RUN_SUMMARY_JSON);
        if !summary_path.exists() {
            debug!(dir = %entry.path().display(), "run directory without summary");
            continue;
        }
        let summary: MigrationRunSummary = serde_json::from_str(
            &std::fs::read_to_string(&summary_path)
                .with_context(|| format!("reading {}", summary_path.display()))?,
        )
        .with_context(|| format!("parsing {}", summary_path.display()))?;
        summaries.push(summary);
    }
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));

    let mut lines = vec!["# Catalog Migration Report".to_string(), String::new()];
    for summary in summaries.into_iter().take(runs.max(1)) {
        let kind = if summary.stats.is_some() { "sync" } else { "categories" };
        lines.push(format!("## Run `{}` ({kind})", summary.run_id));
        lines.push(format!("- started: {}", summary.started_at));
        lines.push(format!("- categories: {}", summary.categories));
        lines.push(format!("- feed products: {}", summary.feed_products));
        lines.push(format!("- catalog products: {}", summary.catalog_products));
        lines.push(format!("- skipped rows: {}", summary.skipped_rows()));
        if let Some(stats) = &summary.stats {
            lines.extend(stats_lines(stats));
        }
        lines.push(format!("- run dir: `{}`", summary.run_dir));
        lines.push(String::new());
    }
    Ok(lines.join("\n"))
}
