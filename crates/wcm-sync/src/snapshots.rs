//! Columnar snapshots of a run for downstream analysis.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{BooleanArray, Float64Array, RecordBatch, StringArray, UInt32Array};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};
use wcm_core::{Category, ReportRow};
use wcm_storage::{describe_export, ExportedFile};

pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotManifest {
    pub schema_version: u32,
    pub files: Vec<ExportedFile>,
}

/// Writes `snapshots/{categories,product_comparison}.parquet` under
/// `run_dir` plus a manifest, returning the manifest path.
pub async fn export_parquet_snapshots(
    run_dir: &Path,
    categories: &[Category],
    rows: &[ReportRow],
) -> Result<PathBuf> {
    let snapshot_dir = run_dir.join("snapshots");
    tokio::fs::create_dir_all(&snapshot_dir)
        .await
        .with_context(|| format!("creating {}", snapshot_dir.display()))?;

    let categories_path = snapshot_dir.join("categories.parquet");
    let comparison_path = snapshot_dir.join("product_comparison.parquet");
    write_categories_parquet(&categories_path, categories)?;
    write_comparison_parquet(&comparison_path, rows)?;

    let manifest = SnapshotManifest {
        schema_version: MANIFEST_SCHEMA_VERSION,
        files: vec![
            describe_export("categories", run_dir, &categories_path).await?,
            describe_export("product_comparison", run_dir, &comparison_path).await?,
        ],
    };
    let manifest_path = snapshot_dir.join("manifest.json");
    let bytes = serde_json::to_vec_pretty(&manifest).context("serializing parquet manifest")?;
    wcm_storage::write_atomic(&manifest_path, &bytes).await?;
    Ok(manifest_path)
}

fn write_parquet(path: &Path, batch: RecordBatch) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)
        .with_context(|| format!("opening parquet writer {}", path.display()))?;
    writer
        .write(&batch)
        .with_context(|| format!("writing record batch {}", path.display()))?;
    writer
        .close()
        .with_context(|| format!("closing parquet writer {}", path.display()))?;
    Ok(())
}

fn write_categories_parquet(path: &Path, categories: &[Category]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::UInt32, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("slug", DataType::Utf8, false),
        Field::new("parent_id", DataType::UInt32, false),
    ]));

    let ids = UInt32Array::from(categories.iter().map(|c| c.id).collect::<Vec<_>>());
    let names = StringArray::from(categories.iter().map(|c| c.name.as_str()).collect::<Vec<_>>());
    let slugs = StringArray::from(categories.iter().map(|c| c.slug.as_str()).collect::<Vec<_>>());
    let parents = UInt32Array::from(categories.iter().map(|c| c.parent_id).collect::<Vec<_>>());

    let batch = RecordBatch::try_new(
        schema,
        vec![Arc::new(ids), Arc::new(names), Arc::new(slugs), Arc::new(parents)],
    )
    .context("building categories record batch")?;
    write_parquet(path, batch)
}

fn write_comparison_parquet(path: &Path, rows: &[ReportRow]) -> Result<()> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("product_name", DataType::Utf8, false),
        Field::new("in_catalog", DataType::Boolean, false),
        Field::new("feed_category", DataType::Utf8, false),
        Field::new("catalog_category", DataType::Utf8, false),
        Field::new("mapped_path", DataType::Utf8, false),
        Field::new("category_confidence", DataType::Float64, false),
        Field::new("match_score", DataType::Float64, false),
        Field::new("nearest_catalog_name", DataType::Utf8, true),
    ]));

    let names = StringArray::from(rows.iter().map(|r| r.product_name.as_str()).collect::<Vec<_>>());
    let in_catalog = BooleanArray::from(rows.iter().map(|r| r.in_catalog).collect::<Vec<_>>());
    let feed_categories =
        StringArray::from(rows.iter().map(|r| r.feed_category.as_str()).collect::<Vec<_>>());
    let catalog_categories =
        StringArray::from(rows.iter().map(|r| r.catalog_category.as_str()).collect::<Vec<_>>());
    let mapped_paths = StringArray::from(
        rows.iter()
            .map(|r| {
                [&r.mapped_category, &r.mapped_subcategory, &r.mapped_sub_subcategory]
                    .into_iter()
                    .filter(|l| !l.is_empty())
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(wcm_core::PATH_SEPARATOR)
            })
            .collect::<Vec<_>>(),
    );
    let confidences = Float64Array::from(rows.iter().map(|r| r.category_confidence).collect::<Vec<_>>());
    let scores = Float64Array::from(rows.iter().map(|r| r.match_score).collect::<Vec<_>>());
    let nearest = StringArray::from(
        rows.iter()
            .map(|r| r.nearest_catalog_name.as_deref())
            .collect::<Vec<_>>(),
    );

    let batch = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(names),
            Arc::new(in_catalog),
            Arc::new(feed_categories),
            Arc::new(catalog_categories),
            Arc::new(mapped_paths),
            Arc::new(confidences),
            Arc::new(scores),
            Arc::new(nearest),
        ],
    )
    .context("building product_comparison record batch")?;
    write_parquet(path, batch)
}
