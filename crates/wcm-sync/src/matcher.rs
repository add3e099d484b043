//! Picks the best category for a product by TF-IDF cosine similarity over
//! unigrams and bigrams of normalized text.

use std::collections::BTreeMap;

use wcm_core::{normalize_text, CategoryMatch, CategoryPath, FeedProduct};

/// Connector words ignored regardless of frequency.
pub const STOP_WORDS: &[&str] = &["de", "la", "el", "y", "en", "con", "para", "por", "los", "las"];

/// Terms must occur in at least this many documents (the product counts as
/// one) to enter the vocabulary.
pub const MIN_DOCUMENT_FREQUENCY: usize = 2;

type TermCounts = BTreeMap<String, usize>;

/// Unigrams followed by bigrams of an already normalized text, stop words
/// removed before pairing.
pub fn terms(normalized: &str) -> Vec<String> {
    let tokens: Vec<&str> = normalized
        .split_whitespace()
        .filter(|t| !STOP_WORDS.contains(t))
        .collect();
    let mut out: Vec<String> = tokens.iter().map(|t| t.to_string()).collect();
    out.extend(tokens.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    out
}

fn term_counts(normalized: &str) -> TermCounts {
    let mut counts = TermCounts::new();
    for term in terms(normalized) {
        *counts.entry(term).or_default() += 1;
    }
    counts
}

fn join_normalized<'a>(pieces: impl IntoIterator<Item = Option<&'a str>>) -> String {
    pieces
        .into_iter()
        .map(normalize_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name, description and tags, normalized and joined.
pub fn product_text(product: &FeedProduct) -> String {
    let tags = product.tags_text();
    join_normalized([
        Some(product.name.as_str()),
        product.description.as_deref(),
        Some(tags.as_str()),
    ])
}

/// The three levels of a category path, normalized and joined.
pub fn category_text(path: &CategoryPath) -> String {
    join_normalized((0..3).map(|level| path.level(level)))
}

/// Category-side half of the vector space, computed once per run. Only the
/// product's own terms change document frequencies between queries, so the
/// result equals refitting the space for every product.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    paths: Vec<CategoryPath>,
    counts: Vec<TermCounts>,
    doc_freq: BTreeMap<String, usize>,
}

impl CategoryIndex {
    pub fn new(paths: &[CategoryPath]) -> Self {
        let counts: Vec<TermCounts> = paths.iter().map(|p| term_counts(&category_text(p))).collect();
        let mut doc_freq = BTreeMap::new();
        for doc in &counts {
            for term in doc.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
        }
        Self {
            paths: paths.to_vec(),
            counts,
            doc_freq,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn paths(&self) -> &[CategoryPath] {
        &self.paths
    }

    /// Cosine similarity of `product_text` (normalized) against every
    /// category, in index order. Each value is within [0, 1].
    pub fn similarities(&self, product_text: &str) -> Vec<f64> {
        let product = term_counts(product_text);
        let total_docs = (self.paths.len() + 1) as f64;

        let idf = |term: &str| -> Option<f64> {
            let df = self.doc_freq.get(term).copied().unwrap_or(0)
                + usize::from(product.contains_key(term));
            (df >= MIN_DOCUMENT_FREQUENCY).then(|| (total_docs / df as f64).ln())
        };

        let product_weights: BTreeMap<&str, f64> = product
            .iter()
            .filter_map(|(term, &count)| idf(term.as_str()).map(|w| (term.as_str(), count as f64 * w)))
            .collect();
        let product_norm = l2_norm(product_weights.values().copied());

        self.counts
            .iter()
            .map(|doc| {
                let mut dot = 0.0;
                let mut squares = 0.0;
                for (term, &count) in doc {
                    let Some(w) = idf(term.as_str()) else {
                        continue;
                    };
                    let weight = count as f64 * w;
                    squares += weight * weight;
                    if let Some(pw) = product_weights.get(term.as_str()) {
                        dot += pw * weight;
                    }
                }
                cosine_from_parts(dot, product_norm, squares.sqrt())
            })
            .collect()
    }

    /// Highest-scoring category; ties go to the lowest index. `None` only when
    /// the index is empty.
    pub fn best_match(&self, product_text: &str) -> Option<CategoryMatch> {
        let scores = self.similarities(product_text);
        let mut best: Option<(usize, f64)> = None;
        for (index, &score) in scores.iter().enumerate() {
            match best {
                Some((_, top)) if score <= top => {}
                _ => best = Some((index, score)),
            }
        }
        let (index, confidence) = best?;
        let path = &self.paths[index];
        Some(CategoryMatch {
            principal: path.level(0).unwrap_or_default().to_string(),
            subcategory: path.level(1).unwrap_or_default().to_string(),
            sub_subcategory: path.level(2).unwrap_or_default().to_string(),
            confidence,
        })
    }

    pub fn match_product(&self, product: &FeedProduct) -> Option<CategoryMatch> {
        self.best_match(&product_text(product))
    }
}

fn l2_norm(values: impl Iterator<Item = f64>) -> f64 {
    values.map(|v| v * v).sum::<f64>().sqrt()
}

/// Zero-length vectors have similarity 0 with everything.
fn cosine_from_parts(dot: f64, norm_a: f64, norm_b: f64) -> f64 {
    if norm_a <= f64::EPSILON || norm_b <= f64::EPSILON {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(0.0, 1.0)
}
