//! WooCommerce import files and reconciliation report, rendered to bytes.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;
use wcm_core::{Category, ComparisonStats, ReportRow};

use crate::enrich::StagedProduct;

pub const CATEGORIES_CSV: &str = "woo_categories.csv";
pub const CATEGORY_MAPPING_JSON: &str = "category_mapping.json";
pub const PRODUCTS_CSV: &str = "woo_products.csv";
pub const COMPARISON_CSV: &str = "product_comparison.csv";
pub const STATS_JSON: &str = "comparison_stats.json";

pub const FALLBACK_TAGS: &[&str] = &["producto", "tecnologia"];
pub const SHORT_DESCRIPTION_CHARS: usize = 150;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("encoding {file}")]
    Csv {
        file: &'static str,
        #[source]
        source: csv::Error,
    },
    #[error("flushing {file}")]
    Io {
        file: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("serializing {file}")]
    Json {
        file: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Serialize)]
struct WooCategoryRow<'a> {
    #[serde(rename = "ID")]
    id: u32,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Slug")]
    slug: &'a str,
    #[serde(rename = "Parent")]
    parent: u32,
    #[serde(rename = "Description")]
    description: &'a str,
    #[serde(rename = "Display type")]
    display_type: &'static str,
    #[serde(rename = "Image")]
    image: &'static str,
    #[serde(rename = "Menu order")]
    menu_order: u32,
    #[serde(rename = "Count")]
    count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingEntry {
    pub id: u32,
    pub slug: String,
    pub parent: u32,
}

/// One line of the WooCommerce product import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WooProductRow {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    #[serde(rename = "SKU")]
    pub sku: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Published")]
    pub published: u8,
    #[serde(rename = "Featured")]
    pub featured: u8,
    #[serde(rename = "Visibility in catalog")]
    pub visibility: &'static str,
    #[serde(rename = "Short description")]
    pub short_description: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Tax status")]
    pub tax_status: &'static str,
    #[serde(rename = "In stock?")]
    pub in_stock: u8,
    #[serde(rename = "Stock")]
    pub stock: String,
    #[serde(rename = "Backorders allowed?")]
    pub backorders_allowed: u8,
    #[serde(rename = "Sold individually?")]
    pub sold_individually: u8,
    #[serde(rename = "Allow customer reviews?")]
    pub allow_reviews: u8,
    #[serde(rename = "Regular price")]
    pub regular_price: String,
    #[serde(rename = "Categories")]
    pub categories: String,
    #[serde(rename = "Tags")]
    pub tags: String,
    #[serde(rename = "Images")]
    pub images: String,
    #[serde(rename = "Position")]
    pub position: u32,
}

impl WooProductRow {
    pub fn from_staged(item: &StagedProduct, image_base_url: &str) -> Self {
        let product = &item.product;
        let categories = match &item.category {
            Some(m) if m.confidence > 0.0 => m.woo_path(),
            _ => format!(
                "Supplier_{}",
                product.category_id.as_deref().unwrap_or_default()
            ),
        };
        Self {
            kind: "simple",
            sku: product.code.clone().unwrap_or_default(),
            name: item.title.clone(),
            published: 1,
            featured: 0,
            visibility: "visible",
            short_description: short_description(&item.description),
            description: item.description.clone(),
            tax_status: "taxable",
            in_stock: u8::from(product.in_stock()),
            stock: format_number(product.stock),
            backorders_allowed: 0,
            sold_individually: 0,
            allow_reviews: 1,
            regular_price: product.price.map(format_number).unwrap_or_default(),
            categories,
            tags: tag_list(&item.tags),
            images: product
                .images
                .iter()
                .map(|image| image_url(image_base_url, image))
                .collect::<Vec<_>>()
                .join("|"),
            position: 0,
        }
    }
}

pub fn short_description(description: &str) -> String {
    if description.chars().count() > SHORT_DESCRIPTION_CHARS {
        let head: String = description.chars().take(SHORT_DESCRIPTION_CHARS).collect();
        format!("{head}...")
    } else {
        description.to_string()
    }
}

/// Deduplicated, sorted, comma-joined; falls back to the generic tags.
pub fn tag_list(tags: &[String]) -> String {
    let set: BTreeSet<&str> = tags.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
    if set.is_empty() {
        return FALLBACK_TAGS.join(", ");
    }
    set.into_iter().collect::<Vec<_>>().join(", ")
}

fn image_url(base: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else {
        format!("{base}{reference}")
    }
}

/// Integral values print without a fractional part.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

fn write_csv<T: Serialize>(file: &'static str, rows: impl IntoIterator<Item = T>) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    {
        let mut writer = csv::Writer::from_writer(&mut buf);
        for row in rows {
            writer
                .serialize(row)
                .map_err(|source| ExportError::Csv { file, source })?;
        }
        writer.flush().map_err(|source| ExportError::Io { file, source })?;
    }
    Ok(buf)
}

fn write_json<T: Serialize + ?Sized>(file: &'static str, value: &T) -> Result<Vec<u8>, ExportError> {
    serde_json::to_vec_pretty(value).map_err(|source| ExportError::Json { file, source })
}

pub fn categories_csv(categories: &[Category]) -> Result<Vec<u8>, ExportError> {
    write_csv(
        CATEGORIES_CSV,
        categories.iter().map(|c| WooCategoryRow {
            id: c.id,
            name: &c.name,
            slug: &c.slug,
            parent: c.parent_id,
            description: &c.description,
            display_type: "default",
            image: "",
            menu_order: 0,
            count: 0,
        }),
    )
}

pub fn category_mapping(categories: &[Category]) -> BTreeMap<String, MappingEntry> {
    categories
        .iter()
        .map(|c| {
            (
                c.name.clone(),
                MappingEntry {
                    id: c.id,
                    slug: c.slug.clone(),
                    parent: c.parent_id,
                },
            )
        })
        .collect()
}

pub fn category_mapping_json(categories: &[Category]) -> Result<Vec<u8>, ExportError> {
    write_json(CATEGORY_MAPPING_JSON, &category_mapping(categories))
}

pub fn products_csv(rows: &[WooProductRow]) -> Result<Vec<u8>, ExportError> {
    write_csv(PRODUCTS_CSV, rows)
}

pub fn comparison_csv(rows: &[ReportRow]) -> Result<Vec<u8>, ExportError> {
    write_csv(COMPARISON_CSV, rows)
}

pub fn stats_json(stats: &ComparisonStats) -> Result<Vec<u8>, ExportError> {
    write_json(STATS_JSON, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wcm_core::{CategoryMatch, FeedProduct};

    fn categories() -> Vec<Category> {
        vec![
            Category {
                id: 1,
                name: "Electrónica".into(),
                slug: "electronica".into(),
                parent_id: 0,
                description: "Productos de Electrónica".into(),
            },
            Category {
                id: 2,
                name: "Audio".into(),
                slug: "electronica-audio".into(),
                parent_id: 1,
                description: "Productos de Audio".into(),
            },
        ]
    }

    fn staged(category: Option<CategoryMatch>) -> StagedProduct {
        StagedProduct::new(
            FeedProduct {
                code: Some("AU-100".into()),
                name: "Auriculares BT".into(),
                description: None,
                tags: vec![],
                stock: 12.0,
                price: Some(1490.5),
                category_id: Some("77".into()),
                images: vec!["img/a.jpg".into(), "https://cdn.example.com/b.jpg".into()],
            },
            category,
        )
    }

    #[test]
    fn category_csv_has_import_columns() {
        let bytes = categories_csv(&categories()).expect("csv");
        let text = String::from_utf8(bytes).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("ID,Name,Slug,Parent,Description,Display type,Image,Menu order,Count")
        );
        assert_eq!(lines.next(), Some("1,Electrónica,electronica,0,Productos de Electrónica,default,,0,0"));
        assert_eq!(lines.next(), Some("2,Audio,electronica-audio,1,Productos de Audio,default,,0,0"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn mapping_is_keyed_by_name() {
        let bytes = category_mapping_json(&categories()).expect("json");
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["Audio"]["id"], 2);
        assert_eq!(value["Audio"]["slug"], "electronica-audio");
        assert_eq!(value["Audio"]["parent"], 1);
    }

    #[test]
    fn product_row_uses_matched_path() {
        let row = WooProductRow::from_staged(
            &staged(Some(CategoryMatch {
                principal: "Electrónica".into(),
                subcategory: "Audio*".into(),
                sub_subcategory: String::new(),
                confidence: 0.42,
            })),
            "https://shop.example.com/",
        );
        assert_eq!(row.categories, "Electrónica > Audio");
        assert_eq!(row.sku, "AU-100");
        assert_eq!(row.stock, "12");
        assert_eq!(row.in_stock, 1);
        assert_eq!(row.regular_price, "1490.5");
        assert_eq!(row.tags, "producto, tecnologia");
        assert_eq!(
            row.images,
            "https://shop.example.com/img/a.jpg|https://cdn.example.com/b.jpg"
        );
        assert!(row.description.starts_with("Producto Auriculares BT disponible."));
    }

    #[test]
    fn zero_confidence_falls_back_to_supplier_category() {
        let zero = CategoryMatch {
            principal: "Audio".into(),
            subcategory: String::new(),
            sub_subcategory: String::new(),
            confidence: 0.0,
        };
        assert_eq!(WooProductRow::from_staged(&staged(Some(zero)), "").categories, "Supplier_77");
        assert_eq!(WooProductRow::from_staged(&staged(None), "").categories, "Supplier_77");
    }

    #[test]
    fn short_description_counts_characters() {
        let long = "á".repeat(151);
        let short = short_description(&long);
        assert_eq!(short.chars().count(), 153);
        assert!(short.ends_with("..."));
        let exact = "b".repeat(150);
        assert_eq!(short_description(&exact), exact);
    }

    #[test]
    fn tags_are_sorted_and_deduplicated() {
        let tags = vec!["usb".to_string(), "audio".into(), "usb".into(), " ".into()];
        assert_eq!(tag_list(&tags), "audio, usb");
        assert_eq!(tag_list(&[]), "producto, tecnologia");
    }

    #[test]
    fn comparison_and_stats_render() {
        let rows = vec![ReportRow {
            product_name: "Mouse".into(),
            in_feed: true,
            in_catalog: false,
            feed_category: "5".into(),
            catalog_category: String::new(),
            mapped_category: "Periféricos".into(),
            mapped_subcategory: "Mouse".into(),
            mapped_sub_subcategory: String::new(),
            category_confidence: 0.5,
            match_score: 0.0,
            nearest_catalog_name: None,
        }];
        let text = String::from_utf8(comparison_csv(&rows).unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("product_name,in_feed,in_catalog,feed_category,catalog_category,mapped_category,mapped_subcategory,mapped_sub_subcategory,category_confidence,match_score,nearest_catalog_name")
        );
        assert_eq!(lines.next(), Some("Mouse,true,false,5,,Periféricos,Mouse,,0.5,0.0,"));

        let stats = ComparisonStats {
            total_products: 1,
            only_in_feed: 1,
            ..Default::default()
        };
        let value: serde_json::Value = serde_json::from_slice(&stats_json(&stats).unwrap()).unwrap();
        assert_eq!(value["total_products"], 1);
        assert_eq!(value["high_match_score"], 0);
    }
}
