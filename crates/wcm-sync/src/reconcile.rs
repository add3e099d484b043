//! Cross-references the supplier feed with the converted catalog and the
//! category matches, one report row per feed product.

use std::collections::{HashMap, HashSet};

use strsim::jaro_winkler;
use wcm_core::{normalize_text, CatalogProduct, CategoryMatch, ComparisonStats, FeedProduct, ReportRow};

pub const HIGH_MATCH_SCORE_THRESHOLD: f64 = 0.8;
pub const HIGH_CATEGORY_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct ReconcileConfig {
    /// Minimum Jaro-Winkler similarity for a near-miss catalog suggestion on
    /// products without an exact counterpart.
    pub near_miss_threshold: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            near_miss_threshold: 0.9,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub rows: Vec<ReportRow>,
    pub stats: ComparisonStats,
}

pub struct Reconciler {
    config: ReconcileConfig,
}

impl Reconciler {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    /// `matches[i]` is the category match for `feed[i]`; missing entries
    /// count as no match.
    pub fn reconcile(
        &self,
        feed: &[FeedProduct],
        catalog: &[CatalogProduct],
        matches: &[Option<CategoryMatch>],
    ) -> Reconciliation {
        let by_name = catalog_by_name(catalog);
        let catalog_names: Vec<(String, &CatalogProduct)> = catalog
            .iter()
            .map(|c| (normalize_text(Some(&c.name)), c))
            .collect();

        let rows: Vec<ReportRow> = feed
            .iter()
            .enumerate()
            .map(|(i, product)| {
                let key = normalize_text(Some(&product.name));
                let counterpart = by_name.get(&key).copied();
                let category = matches.get(i).and_then(Option::as_ref);
                let nearest_catalog_name = match counterpart {
                    Some(_) => None,
                    None => self.nearest_name(&key, &catalog_names),
                };
                ReportRow {
                    product_name: product.name.clone(),
                    in_feed: true,
                    in_catalog: counterpart.is_some(),
                    feed_category: product.category_id.clone().unwrap_or_default(),
                    catalog_category: counterpart
                        .and_then(|c| c.categories.clone())
                        .unwrap_or_default(),
                    mapped_category: category.map(|m| m.principal.clone()).unwrap_or_default(),
                    mapped_subcategory: category.map(|m| m.subcategory.clone()).unwrap_or_default(),
                    mapped_sub_subcategory: category
                        .map(|m| m.sub_subcategory.clone())
                        .unwrap_or_default(),
                    category_confidence: category.map(|m| m.confidence).unwrap_or(0.0),
                    match_score: match_score(product, counterpart),
                    nearest_catalog_name,
                }
            })
            .collect();

        let feed_names: HashSet<String> = feed.iter().map(|p| normalize_text(Some(&p.name))).collect();
        let only_in_catalog = by_name.keys().filter(|k| !feed_names.contains(*k)).count();
        let stats = compute_stats(&rows, only_in_catalog);
        Reconciliation { rows, stats }
    }

    fn nearest_name(&self, key: &str, catalog_names: &[(String, &CatalogProduct)]) -> Option<String> {
        if key.is_empty() {
            return None;
        }
        let mut best: Option<(f64, &CatalogProduct)> = None;
        for (name, product) in catalog_names {
            let score = jaro_winkler(key, name);
            if score < self.config.near_miss_threshold {
                continue;
            }
            if best.map_or(true, |(top, _)| score > top) {
                best = Some((score, product));
            }
        }
        best.map(|(_, product)| product.name.clone())
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(ReconcileConfig::default())
    }
}

/// Index by normalized name; a later row with the same key replaces an
/// earlier one.
pub fn catalog_by_name(catalog: &[CatalogProduct]) -> HashMap<String, &CatalogProduct> {
    catalog
        .iter()
        .map(|c| (normalize_text(Some(&c.name)), c))
        .collect()
}

/// Name equality earns 1 of 1 point; when both descriptions are present their
/// token-set Jaccard overlap earns up to 1 more of 1 more possible.
pub fn match_score(feed: &FeedProduct, catalog: Option<&CatalogProduct>) -> f64 {
    let Some(catalog) = catalog else {
        return 0.0;
    };
    let mut earned = 0.0;
    let mut possible = 0.0;

    if normalize_text(Some(&feed.name)) == normalize_text(Some(&catalog.name)) {
        earned += 1.0;
    }
    possible += 1.0;

    let feed_desc = normalize_text(feed.description.as_deref());
    let catalog_desc = normalize_text(catalog.description.as_deref());
    if !feed_desc.is_empty() && !catalog_desc.is_empty() {
        earned += token_jaccard(&feed_desc, &catalog_desc);
        possible += 1.0;
    }

    earned / possible
}

pub fn token_jaccard(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

pub fn compute_stats(rows: &[ReportRow], only_in_catalog: usize) -> ComparisonStats {
    ComparisonStats {
        total_products: rows.len(),
        in_both_sources: rows.iter().filter(|r| r.in_feed && r.in_catalog).count(),
        only_in_feed: rows.iter().filter(|r| r.in_feed && !r.in_catalog).count(),
        only_in_catalog,
        high_match_score: rows
            .iter()
            .filter(|r| r.match_score > HIGH_MATCH_SCORE_THRESHOLD)
            .count(),
        high_category_confidence: rows
            .iter()
            .filter(|r| r.category_confidence > HIGH_CATEGORY_CONFIDENCE_THRESHOLD)
            .count(),
    }
}
