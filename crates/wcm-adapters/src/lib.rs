//! Source loader contracts + loaders for the category table, the supplier feed
//! and the previously converted catalog.

use std::fs;
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use wcm_core::{normalize_text, CatalogProduct, CategoryPath, FeedProduct};

pub const CRATE_NAME: &str = "wcm-adapters";

pub const CATEGORY_TABLE_SOURCE: &str = "category-table";
pub const SUPPLIER_FEED_SOURCE: &str = "supplier-feed";
pub const CATALOG_CSV_SOURCE: &str = "catalog-csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// Raw bytes of one input file, kept around so the pipeline can archive
/// exactly what it parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSource {
    pub source_id: String,
    pub path: PathBuf,
    pub format: SourceFormat,
    pub bytes: Vec<u8>,
}

/// A row that parsed but could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedRow {
    /// 1-based position in the source (CSV line including the header, or
    /// JSON array index + 1).
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub skipped: Vec<SkippedRow>,
}

impl<T> Default for Loaded<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

impl<T> Loaded<T> {
    fn skip(&mut self, row: usize, reason: impl Into<String>) {
        self.skipped.push(SkippedRow {
            row,
            reason: reason.into(),
        });
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported source format for {} (expected .csv or .json)", path.display())]
    UnsupportedFormat { path: PathBuf },
    #[error("source {source_id} expects {expected:?} input, got {}", path.display())]
    WrongFormat {
        source_id: String,
        expected: SourceFormat,
        path: PathBuf,
    },
    #[error("parsing CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("parsing JSON {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} has no `{column}` column", path.display())]
    MissingColumn { path: PathBuf, column: &'static str },
    #[error("{}: {message}", path.display())]
    Shape { path: PathBuf, message: String },
}

pub trait SourceLoader {
    type Record;

    fn source_id(&self) -> &'static str;
    fn format(&self) -> SourceFormat;
    fn parse(&self, raw: &RawSource) -> Result<Loaded<Self::Record>, LoadError>;

    fn load(&self, path: &Path) -> Result<(RawSource, Loaded<Self::Record>), LoadError> {
        let raw = load_raw_source(self.source_id(), path)?;
        if raw.format != self.format() {
            return Err(LoadError::WrongFormat {
                source_id: self.source_id().to_string(),
                expected: self.format(),
                path: raw.path,
            });
        }
        let loaded = self.parse(&raw)?;
        Ok((raw, loaded))
    }
}

pub fn load_raw_source(source_id: &str, path: impl AsRef<Path>) -> Result<RawSource, LoadError> {
    let path = path.as_ref();
    let format = SourceFormat::from_path(path).ok_or_else(|| LoadError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let bytes = fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(RawSource {
        source_id: source_id.to_string(),
        path: path.to_path_buf(),
        format,
        bytes,
    })
}

/// `Categoría Principal`, `Subcategoría`, `Sub-subcategoría` table.
#[derive(Debug, Clone, Copy, Default)]
pub struct CategoryTableLoader;

/// Supplier JSON feed: a top-level array, or an object with a `products` array.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupplierFeedLoader;

/// Catalog CSV produced by an earlier conversion (`Name`, `Categories`,
/// `Description`).
#[derive(Debug, Clone, Copy, Default)]
pub struct CatalogCsvLoader;

const PRINCIPAL_HEADERS: &[&str] = &["categoria principal", "principal", "category"];
const SUBCATEGORY_HEADERS: &[&str] = &["subcategoria", "subcategory"];
const SUB_SUBCATEGORY_HEADERS: &[&str] = &["sub subcategoria", "sub subcategory", "subsubcategoria"];

const NAME_HEADERS: &[&str] = &["name", "nombre", "title"];
const CATEGORIES_HEADERS: &[&str] = &["categories", "categorias", "category"];
const DESCRIPTION_HEADERS: &[&str] = &["description", "descripcion"];

impl SourceLoader for CategoryTableLoader {
    type Record = CategoryPath;

    fn source_id(&self) -> &'static str {
        CATEGORY_TABLE_SOURCE
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn parse(&self, raw: &RawSource) -> Result<Loaded<CategoryPath>, LoadError> {
        let mut reader = csv_reader(&raw.bytes);
        let headers = read_headers(&mut reader, &raw.path)?;
        let principal = header_index(&headers, PRINCIPAL_HEADERS).ok_or_else(|| {
            LoadError::MissingColumn {
                path: raw.path.clone(),
                column: "Categoría Principal",
            }
        })?;
        let sub = header_index(&headers, SUBCATEGORY_HEADERS);
        let sub_sub = header_index(&headers, SUB_SUBCATEGORY_HEADERS);

        let mut loaded = Loaded::default();
        for (index, result) in reader.records().enumerate() {
            let row = index + 2;
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    loaded.skip(row, err.to_string());
                    continue;
                }
            };
            let labels = [Some(principal), sub, sub_sub]
                .into_iter()
                .filter_map(|idx| cell(&record, idx))
                .collect::<Vec<_>>();
            match CategoryPath::from_labels(labels) {
                Some(path) => loaded.records.push(path),
                None => loaded.skip(row, "no category labels"),
            }
        }
        Ok(loaded)
    }
}

impl SourceLoader for CatalogCsvLoader {
    type Record = CatalogProduct;

    fn source_id(&self) -> &'static str {
        CATALOG_CSV_SOURCE
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }

    fn parse(&self, raw: &RawSource) -> Result<Loaded<CatalogProduct>, LoadError> {
        let mut reader = csv_reader(&raw.bytes);
        let headers = read_headers(&mut reader, &raw.path)?;
        let name = header_index(&headers, NAME_HEADERS).ok_or_else(|| LoadError::MissingColumn {
            path: raw.path.clone(),
            column: "Name",
        })?;
        let categories = header_index(&headers, CATEGORIES_HEADERS);
        let description = header_index(&headers, DESCRIPTION_HEADERS);

        let mut loaded = Loaded::default();
        for (index, result) in reader.records().enumerate() {
            let row = index + 2;
            let record = match result {
                Ok(record) => record,
                Err(err) => {
                    loaded.skip(row, err.to_string());
                    continue;
                }
            };
            let Some(product_name) = cell(&record, Some(name)) else {
                loaded.skip(row, "missing product name");
                continue;
            };
            loaded.records.push(CatalogProduct {
                name: product_name,
                categories: cell(&record, categories),
                description: cell(&record, description),
            });
        }
        Ok(loaded)
    }
}

impl SourceLoader for SupplierFeedLoader {
    type Record = FeedProduct;

    fn source_id(&self) -> &'static str {
        SUPPLIER_FEED_SOURCE
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }

    fn parse(&self, raw: &RawSource) -> Result<Loaded<FeedProduct>, LoadError> {
        let value: JsonValue = serde_json::from_slice(&raw.bytes).map_err(|source| LoadError::Json {
            path: raw.path.clone(),
            source,
        })?;
        let items = match &value {
            JsonValue::Array(items) => items,
            JsonValue::Object(map) => map
                .get("products")
                .and_then(JsonValue::as_array)
                .ok_or_else(|| LoadError::Shape {
                    path: raw.path.clone(),
                    message: "expected an array or an object with a `products` array".to_string(),
                })?,
            _ => {
                return Err(LoadError::Shape {
                    path: raw.path.clone(),
                    message: "expected an array of products".to_string(),
                })
            }
        };

        let mut loaded = Loaded::default();
        for (index, item) in items.iter().enumerate() {
            match feed_product_from_json(item) {
                Ok(product) => loaded.records.push(product),
                Err(reason) => loaded.skip(index + 1, reason),
            }
        }
        Ok(loaded)
    }
}

fn feed_product_from_json(item: &JsonValue) -> Result<FeedProduct, String> {
    if !item.is_object() {
        return Err(format!("expected an object, found {}", json_kind(item)));
    }
    let name = json_text(item, &["name", "title"]).ok_or("missing product name")?;
    Ok(FeedProduct {
        code: json_text(item, &["code", "sku"]),
        name,
        description: json_text(item, &["description"]),
        tags: json_tags(item),
        stock: json_number(item, &["stock"]).unwrap_or(0.0),
        price: json_number(item, &["price"]),
        category_id: json_text(item, &["category_id", "category"]),
        images: json_images(item),
    })
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn text_or_none(value: String) -> Option<String> {
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// First of `keys` holding a non-blank string or a number.
fn json_text(value: &JsonValue, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| match value.get(*key)? {
        JsonValue::String(s) => text_or_none(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

fn json_number(value: &JsonValue, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| match value.get(*key)? {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

fn json_tags(value: &JsonValue) -> Vec<String> {
    match value.get("tags") {
        Some(JsonValue::String(s)) => s
            .split(',')
            .filter_map(|t| text_or_none(t.to_string()))
            .collect(),
        Some(JsonValue::Array(items)) => items
            .iter()
            .filter_map(|t| t.as_str().and_then(|s| text_or_none(s.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

fn json_images(value: &JsonValue) -> Vec<String> {
    let Some(items) = value
        .get("images")
        .or_else(|| value.get("image"))
        .and_then(JsonValue::as_array)
    else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| match item {
            JsonValue::String(s) => text_or_none(s.clone()),
            JsonValue::Object(_) => json_text(item, &["urlImage", "url", "src"]),
            _ => None,
        })
        .collect()
}

fn csv_reader(bytes: &[u8]) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().flexible(true).from_reader(bytes)
}

fn read_headers(reader: &mut csv::Reader<&[u8]>, path: &Path) -> Result<StringRecord, LoadError> {
    reader
        .headers()
        .map(Clone::clone)
        .map_err(|source| LoadError::Csv {
            path: path.to_path_buf(),
            source,
        })
}

/// Header lookup tolerant of accents, case, BOM and punctuation.
fn header_index(headers: &StringRecord, aliases: &[&str]) -> Option<usize> {
    headers.iter().position(|header| {
        let key = normalize_text(Some(header.trim_start_matches('\u{feff}')));
        aliases.iter().any(|alias| key == *alias)
    })
}

fn cell(record: &StringRecord, index: Option<usize>) -> Option<String> {
    record
        .get(index?)
        .and_then(|value| text_or_none(value.to_string()))
}
