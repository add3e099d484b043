//! Core domain model and text canonicalization for the catalog migrator.

use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "wcm-core";

/// Separator used in the canonical string form of a category path.
pub const PATH_SEPARATOR: &str = "->";

/// Maximum number of levels a category path may carry.
pub const MAX_PATH_DEPTH: usize = 3;

/// Ordered 1..=3 label sequence (principal, subcategory, sub-subcategory) as
/// extracted from a source row. Labels are kept raw; cleaning happens when the
/// tree is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryPath {
    labels: Vec<String>,
}

impl CategoryPath {
    /// Builds a path from up to three labels, dropping blank ones. Returns
    /// `None` when no label survives.
    pub fn from_labels<I, S>(labels: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels: Vec<String> = labels
            .into_iter()
            .map(|l| l.as_ref().trim().to_string())
            .filter(|l| !l.is_empty())
            .take(MAX_PATH_DEPTH)
            .collect();
        if labels.is_empty() {
            None
        } else {
            Some(Self { labels })
        }
    }

    /// Parses the canonical `A->B->C` form.
    pub fn parse(canonical: &str) -> Option<Self> {
        Self::from_labels(canonical.split(PATH_SEPARATOR))
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn level(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn depth(&self) -> usize {
        self.labels.len()
    }

    pub fn canonical(&self) -> String {
        self.labels.join(PATH_SEPARATOR)
    }
}

/// A node of the flattened category tree, ready for catalog import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: u32,
    pub name: String,
    pub slug: String,
    /// 0 for root categories.
    pub parent_id: u32,
    pub description: String,
}

impl Category {
    pub fn is_root(&self) -> bool {
        self.parent_id == 0
    }
}

/// Supplier feed record, already lifted out of whichever JSON shape the
/// supplier exported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FeedProduct {
    pub code: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub stock: f64,
    pub price: Option<f64>,
    pub category_id: Option<String>,
    /// Image references as exported (relative paths or absolute URLs).
    pub images: Vec<String>,
}

impl FeedProduct {
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }

    pub fn in_stock(&self) -> bool {
        self.stock > 0.0
    }
}

/// Record from the previously converted catalog CSV.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CatalogProduct {
    pub name: String,
    pub categories: Option<String>,
    pub description: Option<String>,
}

/// Best category for one product plus the cosine similarity that chose it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub principal: String,
    pub subcategory: String,
    pub sub_subcategory: String,
    pub confidence: f64,
}

impl CategoryMatch {
    /// Non-empty labels joined the way WooCommerce's CSV importer expects.
    pub fn woo_path(&self) -> String {
        [&self.principal, &self.subcategory, &self.sub_subcategory]
            .into_iter()
            .map(|l| clean_category_name(l))
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

/// One reconciliation row per feed product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub product_name: String,
    pub in_feed: bool,
    pub in_catalog: bool,
    pub feed_category: String,
    pub catalog_category: String,
    pub mapped_category: String,
    pub mapped_subcategory: String,
    pub mapped_sub_subcategory: String,
    pub category_confidence: f64,
    pub match_score: f64,
    pub nearest_catalog_name: Option<String>,
}

/// Aggregate counts over a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ComparisonStats {
    pub total_products: usize,
    pub in_both_sources: usize,
    pub only_in_feed: usize,
    pub only_in_catalog: usize,
    pub high_match_score: usize,
    pub high_category_confidence: usize,
}

/// Lower-cases and transliterates to ASCII (`categoría` -> `categoria`).
pub fn fold_ascii(text: &str) -> String {
    deunicode::deunicode(&text.to_lowercase()).to_ascii_lowercase()
}

/// Canonical comparison form: lower-case, ASCII, `[a-z0-9 ]` only, single
/// spaces, trimmed. Absent text normalizes to the empty string.
pub fn normalize_text(text: Option<&str>) -> String {
    let Some(text) = text else {
        return String::new();
    };
    fold_ascii(text)
        .chars()
        .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Display form of a category label: asterisks and outline numbering
/// (`8.1. `) removed, whitespace collapsed.
pub fn clean_category_name(name: &str) -> String {
    let without_markers = name.replace('*', "");
    let trimmed = strip_outline_prefix(without_markers.trim());
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_outline_prefix(text: &str) -> &str {
    let prefix_len = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    let prefix = &text[..prefix_len];
    let rest = &text[prefix_len..];
    let numbered = prefix.starts_with(|c: char| c.is_ascii_digit()) && prefix.ends_with('.');
    if numbered && rest.starts_with(char::is_whitespace) {
        rest.trim_start()
    } else {
        text
    }
}

/// Slug for a single label; empty when nothing alphanumeric survives.
pub fn slugify(label: &str) -> String {
    let folded = fold_ascii(&clean_category_name(label));
    let mut out = String::with_capacity(folded.len());
    let mut pending_hyphen = false;
    for c in folded.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_hyphen && !out.is_empty() {
                out.push('-');
            }
            pending_hyphen = false;
            out.push(c);
        } else {
            pending_hyphen = true;
        }
    }
    out
}

/// Slug over a whole ancestor chain. Accepts either separate labels or
/// labels that themselves contain the `->` separator.
pub fn slugify_path<S: AsRef<str>>(parts: &[S]) -> String {
    parts
        .iter()
        .flat_map(|p| p.as_ref().split(PATH_SEPARATOR))
        .map(slugify)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_accents_and_punctuation() {
        assert_eq!(
            normalize_text(Some("  Mouse USB   inalámbrico!! (2.4GHz) ")),
            "mouse usb inalambrico 2 4ghz"
        );
        assert_eq!(normalize_text(None), "");
        assert_eq!(normalize_text(Some("¡¿--?!")), "");
    }

    #[test]
    fn clean_name_removes_markers_and_outline_numbers() {
        assert_eq!(clean_category_name("* Auriculares*"), "Auriculares");
        assert_eq!(clean_category_name("8.1. Cámaras   de  fotos"), "Cámaras de fotos");
        assert_eq!(clean_category_name("3. Audio"), "Audio");
        assert_eq!(clean_category_name("3.5 mm Jack"), "3.5 mm Jack");
        assert_eq!(clean_category_name("2024"), "2024");
    }

    #[test]
    fn slug_transliterates_latin1() {
        assert_eq!(slugify("categoría"), "categoria");
        assert_eq!(slugify("  Niños & Bebés  "), "ninos-bebes");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn slug_is_idempotent() {
        for input in ["Electrónica->Audio->Auriculares*", "Cámaras (IP) / Wi-Fi", "8.1. Redes"] {
            let once = slugify_path(&[input]);
            assert_eq!(slugify_path(&[once.as_str()]), once, "input {input}");
            assert!(!once.starts_with('-') && !once.ends_with('-'));
            assert!(!once.contains("--"));
        }
    }

    #[test]
    fn slug_path_joins_all_ancestors() {
        assert_eq!(
            slugify_path(&["Electrónica", "Audio", "Auriculares*"]),
            "electronica-audio-auriculares"
        );
        assert_eq!(slugify_path(&["Electrónica->Video"]), "electronica-video");
    }

    #[test]
    fn category_path_drops_blank_labels() {
        let path = CategoryPath::from_labels(["Electrónica", "  ", "Audio"]).unwrap();
        assert_eq!(path.canonical(), "Electrónica->Audio");
        assert_eq!(path.depth(), 2);
        assert!(CategoryPath::from_labels(["", " "]).is_none());
        assert_eq!(CategoryPath::parse("A->B->C->D").unwrap().depth(), 3);
    }

    #[test]
    fn woo_path_uses_clean_labels() {
        let m = CategoryMatch {
            principal: "Electrónica".into(),
            subcategory: "8.1. Audio".into(),
            sub_subcategory: String::new(),
            confidence: 0.5,
        };
        assert_eq!(m.woo_path(), "Electrónica > Audio");
    }
}
