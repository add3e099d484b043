//! Product staging and the rule-driven enrichment applied before export.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use wcm_core::{fold_ascii, CategoryMatch, FeedProduct};

/// A feed product on its way to the WooCommerce product CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagedProduct {
    pub product: FeedProduct,
    pub category: Option<CategoryMatch>,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl StagedProduct {
    pub fn new(product: FeedProduct, category: Option<CategoryMatch>) -> Self {
        let description = product
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_description(&product.name));
        Self {
            title: product.name.clone(),
            tags: product.tags.clone(),
            description,
            category,
            product,
        }
    }
}

pub fn default_description(name: &str) -> String {
    format!("Producto {name} disponible. Consulte especificaciones y disponibilidad.")
}

pub trait EnrichmentHook: Send + Sync {
    fn apply(&self, items: Vec<StagedProduct>) -> Result<Vec<StagedProduct>>;
}

#[derive(Default)]
pub struct NoopEnrichmentHook;

impl EnrichmentHook for NoopEnrichmentHook {
    fn apply(&self, items: Vec<StagedProduct>) -> Result<Vec<StagedProduct>> {
        Ok(items)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct TagRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    rules: Vec<TagRule>,
}

#[derive(Debug, Clone, Deserialize)]
struct TagRule {
    tags: Vec<String>,
    contains_any: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TitleRulesFile {
    #[allow(dead_code)]
    version: u32,
    #[serde(default)]
    preserve: Vec<String>,
    #[serde(default)]
    translations: BTreeMap<String, String>,
}

/// Keyword tagging (`tags.yaml`) and whole-word title translation
/// (`titles.yaml`).
pub struct YamlRuleEnrichmentHook {
    tag_rules: Vec<TagRule>,
    preserve: HashSet<String>,
    translations: BTreeMap<String, String>,
}

impl YamlRuleEnrichmentHook {
    pub fn from_rules_dir(rules_dir: &Path) -> Result<Self> {
        let tags_path = rules_dir.join("tags.yaml");
        let titles_path = rules_dir.join("titles.yaml");
        let tags = std::fs::read_to_string(&tags_path)
            .with_context(|| format!("reading {}", tags_path.display()))?;
        let titles = std::fs::read_to_string(&titles_path)
            .with_context(|| format!("reading {}", titles_path.display()))?;
        Self::from_yaml(&tags, &titles).with_context(|| format!("parsing rules in {}", rules_dir.display()))
    }

    pub fn from_yaml(tags_yaml: &str, titles_yaml: &str) -> Result<Self> {
        let tags: TagRulesFile = serde_yaml::from_str(tags_yaml).context("parsing tags.yaml")?;
        let titles: TitleRulesFile = serde_yaml::from_str(titles_yaml).context("parsing titles.yaml")?;
        Ok(Self {
            tag_rules: tags.rules,
            preserve: titles.preserve.iter().map(|t| fold_ascii(t)).collect(),
            translations: titles
                .translations
                .into_iter()
                .map(|(from, to)| (fold_ascii(&from), to))
                .collect(),
        })
    }

    /// Replaces whole words only; surrounding punctuation is kept and
    /// preserved terms are never translated.
    pub fn translate_title(&self, title: &str) -> String {
        title
            .split(' ')
            .map(|token| {
                let core = token.trim_matches(|c: char| !c.is_alphanumeric());
                if core.is_empty() {
                    return token.to_string();
                }
                let key = fold_ascii(core);
                if self.preserve.contains(&key) {
                    return token.to_string();
                }
                match self.translations.get(&key) {
                    Some(to) => token.replacen(core, to, 1),
                    None => token.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn keyword_tags(&self, title: &str, description: &str) -> Vec<String> {
        let combined = fold_ascii(&format!("{title} {description}"));
        let mut tags = Vec::new();
        for rule in &self.tag_rules {
            if rule
                .contains_any
                .iter()
                .any(|needle| combined.contains(&fold_ascii(needle)))
            {
                for tag in &rule.tags {
                    if !tags.contains(tag) {
                        tags.push(tag.clone());
                    }
                }
            }
        }
        tags
    }
}

impl EnrichmentHook for YamlRuleEnrichmentHook {
    fn apply(&self, mut items: Vec<StagedProduct>) -> Result<Vec<StagedProduct>> {
        for item in &mut items {
            for tag in self.keyword_tags(&item.product.name, &item.description) {
                if !item.tags.contains(&tag) {
                    item.tags.push(tag);
                }
            }
            item.title = self.translate_title(&item.product.name);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TAGS: &str = r#"
version: 1
rules:
  - tags: [USB, conectividad]
    contains_any: [usb]
  - tags: [auriculares, audio]
    contains_any: [auricular]
  - tags: [wireless, inalámbrico]
    contains_any: [wireless, inalámbrico]
"#;

    const TITLES: &str = r#"
version: 1
preserve: [ARGOM, USB]
translations:
  AURICULARES: Headphones
  MOUSE: Mouse
  INALAMBRICO: Wireless
  USB: Universal
"#;

    fn hook() -> YamlRuleEnrichmentHook {
        YamlRuleEnrichmentHook::from_yaml(TAGS, TITLES).expect("rules")
    }

    fn product(name: &str, description: Option<&str>) -> FeedProduct {
        FeedProduct {
            name: name.to_string(),
            description: description.map(str::to_string),
            tags: vec!["oferta".into()],
            ..Default::default()
        }
    }

    #[test]
    fn staging_fills_default_description() {
        let staged = StagedProduct::new(product("Cable HDMI", Some("   ")), None);
        assert_eq!(
            staged.description,
            "Producto Cable HDMI disponible. Consulte especificaciones y disponibilidad."
        );
        assert_eq!(staged.title, "Cable HDMI");
        assert_eq!(staged.tags, vec!["oferta"]);
    }

    #[test]
    fn titles_translate_whole_words_only() {
        let hook = hook();
        assert_eq!(
            hook.translate_title("AURICULARES ARGOM Inalámbrico, USB"),
            "Headphones ARGOM Wireless, USB"
        );
        // "MOUSEPAD" contains a translatable word but is not one.
        assert_eq!(hook.translate_title("MOUSEPAD gamer"), "MOUSEPAD gamer");
        assert_eq!(hook.translate_title(""), "");
    }

    #[test]
    fn keyword_tags_ignore_case_and_accents() {
        let tags = hook().keyword_tags("Auricular Bluetooth", "Conexión INALAMBRICO y usb-c");
        assert_eq!(
            tags,
            vec!["USB", "conectividad", "auriculares", "audio", "wireless", "inalámbrico"]
        );
        assert!(hook().keyword_tags("Silla", "").is_empty());
    }

    #[test]
    fn apply_merges_feed_and_rule_tags() {
        let staged = vec![StagedProduct::new(product("AURICULARES USB", None), None)];
        let out = hook().apply(staged).expect("apply");
        assert_eq!(out[0].title, "Headphones USB");
        assert_eq!(out[0].tags, vec!["oferta", "USB", "conectividad", "auriculares", "audio"]);
    }

    #[test]
    fn rules_load_from_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("tags.yaml"), TAGS).unwrap();
        std::fs::write(dir.path().join("titles.yaml"), TITLES).unwrap();
        let hook = YamlRuleEnrichmentHook::from_rules_dir(dir.path()).expect("load");
        assert_eq!(hook.translate_title("MOUSE"), "Mouse");

        let missing = YamlRuleEnrichmentHook::from_rules_dir(&dir.path().join("nope"));
        assert!(missing.is_err());
    }
}
