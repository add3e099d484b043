use std::collections::HashMap;
use std::path::{Path, PathBuf};

use wcm_core::ComparisonStats;
use wcm_sync::snapshots::SnapshotManifest;
use wcm_sync::{report_runs_markdown, MigrationConfig, MigrationPipeline};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

fn sample_config(out: &Path) -> MigrationConfig {
    let sample = workspace_root().join("fixtures/sample");
    MigrationConfig {
        categories_csv: sample.join("categorias.csv"),
        feed_json: sample.join("feed.json"),
        catalog_csv: sample.join("catalog.csv"),
        output_dir: out.join("output"),
        artifacts_dir: out.join("artifacts"),
        image_base_url: "https://shop.example.com/".into(),
        rules_dir: workspace_root().join("rules"),
    }
}

fn products_by_sku(path: &Path) -> HashMap<String, HashMap<String, String>> {
    let mut reader = csv::Reader::from_path(path).expect("open products csv");
    let headers = reader.headers().expect("headers").clone();
    reader
        .records()
        .map(|record| {
            let record = record.expect("record");
            let row: HashMap<String, String> = headers
                .iter()
                .zip(record.iter())
                .map(|(h, v)| (h.to_string(), v.to_string()))
                .collect();
            (row["SKU"].clone(), row)
        })
        .collect()
}

#[tokio::test]
async fn sample_fixtures_run_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pipeline = MigrationPipeline::from_config(sample_config(dir.path())).expect("pipeline");
    let summary = pipeline.run_once().await.expect("run");

    assert_eq!(summary.categories, 9);
    assert_eq!(summary.feed_products, 3);
    assert_eq!(summary.catalog_products, 3);
    assert_eq!(summary.skipped_rows(), 4);
    assert_eq!(
        summary.stats,
        Some(ComparisonStats {
            total_products: 3,
            in_both_sources: 2,
            only_in_feed: 1,
            only_in_catalog: 1,
            high_match_score: 1,
            high_category_confidence: 0,
        })
    );

    let run_dir = PathBuf::from(&summary.run_dir);
    for name in [
        "woo_categories.csv",
        "category_mapping.json",
        "woo_products.csv",
        "product_comparison.csv",
        "comparison_stats.json",
        "run_summary.json",
        "run_summary.md",
    ] {
        assert!(run_dir.join(name).exists(), "missing {name}");
    }
    assert_eq!(summary.exports.len(), 5);

    let categories = std::fs::read_to_string(run_dir.join("woo_categories.csv")).unwrap();
    let slugs: Vec<&str> = categories
        .lines()
        .skip(1)
        .map(|line| line.split(',').nth(2).unwrap())
        .collect();
    assert_eq!(
        slugs,
        vec![
            "electronica",
            "electronica-audio",
            "electronica-audio-auriculares",
            "electronica-video",
            "perifericos",
            "perifericos-mouse",
            "perifericos-teclados",
            "redes",
            "redes-routers",
        ]
    );

    let products = products_by_sku(&run_dir.join("woo_products.csv"));
    let headphones = &products["AU-100"];
    assert_eq!(headphones["Name"], "Headphones Bluetooth Negro");
    assert_eq!(headphones["Categories"], "Electrónica > Audio > Auriculares");
    assert_eq!(headphones["Images"], "https://shop.example.com/img/au-100.jpg");
    assert_eq!(headphones["In stock?"], "1");

    let mouse = &products["MO-200"];
    assert_eq!(mouse["Name"], "Mouse USB Wireless");
    assert_eq!(mouse["Categories"], "Periféricos > Mouse");
    assert_eq!(mouse["In stock?"], "0");
    assert_eq!(mouse["Regular price"], "390.5");
    assert_eq!(
        mouse["Tags"],
        "USB, conectividad, inalámbrico, mouse, periférico, wireless"
    );
    assert!(mouse["Description"].starts_with("Producto Mouse USB inalámbrico disponible."));

    // No shared vocabulary with any category: falls back to the supplier id.
    assert_eq!(products["RT-300"]["Categories"], "Supplier_44");

    let manifest: SnapshotManifest = serde_json::from_slice(
        &std::fs::read(summary.parquet_manifest.as_deref().expect("manifest")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.files.len(), 2);

    for source in &summary.sources {
        assert!(Path::new(&source.archived_at).exists(), "{} not archived", source.source_id);
    }
}

#[tokio::test]
async fn categories_only_run_shares_input_hash_and_report_lists_both() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = sample_config(dir.path());
    let pipeline = MigrationPipeline::new(config.clone());

    let full = pipeline.run_once().await.expect("sync run");
    let categories_only = pipeline.export_categories().await.expect("categories run");
    assert_eq!(categories_only.categories, full.categories);
    assert!(categories_only.stats.is_none());
    assert_eq!(categories_only.exports.len(), 2);

    // Same input bytes, same content hash.
    assert_eq!(categories_only.sources[0].sha256, full.sources[0].sha256);

    let report = report_runs_markdown(10, &config.output_dir).expect("report");
    assert!(report.contains(&full.run_id.to_string()));
    assert!(report.contains(&categories_only.run_id.to_string()));
}

#[tokio::test]
async fn missing_input_fails_with_path_context() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = sample_config(dir.path());
    config.feed_json = dir.path().join("absent.json");
    let err = MigrationPipeline::new(config)
        .run_once()
        .await
        .expect_err("missing feed");
    let chain = format!("{err:#}");
    assert!(chain.contains("absent.json"), "{chain}");
    assert!(chain.contains("supplier-feed"), "{chain}");
}
