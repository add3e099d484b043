//! Flattens category paths into a parent-linked, import-ready list.

use std::collections::{BTreeMap, HashSet};

use wcm_core::{clean_category_name, slugify_path, Category, CategoryPath};

/// Deduplicates paths by their canonical `A->B->C` form, keeping first-seen
/// order so id assignment is reproducible across runs.
pub fn unique_paths<I>(paths: I) -> Vec<CategoryPath>
where
    I: IntoIterator<Item = CategoryPath>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(path.canonical()))
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryTree {
    categories: Vec<Category>,
    ids_by_name: BTreeMap<String, u32>,
}

impl CategoryTree {
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn into_categories(self) -> Vec<Category> {
        self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// Looks a label up by its cleaned form.
    pub fn id_of(&self, label: &str) -> Option<u32> {
        self.ids_by_name.get(&clean_category_name(label)).copied()
    }

    pub fn get(&self, id: u32) -> Option<&Category> {
        // ids are dense and 1-based
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.categories.get(index)
    }

    /// Root-first chain ending at `id`.
    pub fn lineage(&self, id: u32) -> Vec<&Category> {
        let mut chain = Vec::new();
        let mut current = self.get(id);
        while let Some(category) = current {
            chain.push(category);
            if category.is_root() || chain.len() > self.categories.len() {
                break;
            }
            current = self.get(category.parent_id);
        }
        chain.reverse();
        chain
    }

    fn insert(&mut self, name: String, slug: String, parent_id: u32) -> u32 {
        let id = self.categories.len() as u32 + 1;
        self.ids_by_name.insert(name.clone(), id);
        self.categories.push(Category {
            id,
            description: format!("Productos de {name}"),
            name,
            slug,
            parent_id,
        });
        id
    }
}

/// Walks every path root to leaf. A cleaned name is one node no matter which
/// branch mentions it: the first path to introduce a name fixes its id, slug
/// and parent, and later paths only route through it.
pub fn build_category_tree(paths: &[CategoryPath]) -> CategoryTree {
    let mut tree = CategoryTree::default();
    for path in paths {
        let mut current_parent = 0u32;
        let mut chain: Vec<String> = Vec::with_capacity(path.depth());
        for label in path.labels() {
            let name = clean_category_name(label);
            if name.is_empty() {
                continue;
            }
            chain.push(name.clone());
            let existing = tree.ids_by_name.get(&name).copied();
            current_parent = match existing {
                Some(id) => id,
                None => {
                    let slug = slugify_path(&chain);
                    tree.insert(name, slug, current_parent)
                }
            };
        }
    }
    tree
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<CategoryPath> {
        items.iter().filter_map(|p| CategoryPath::parse(p)).collect()
    }

    fn assert_tree_invariants(tree: &CategoryTree) {
        let ids: HashSet<u32> = tree.categories().iter().map(|c| c.id).collect();
        for category in tree.categories() {
            assert!(
                category.parent_id == 0 || ids.contains(&category.parent_id),
                "dangling parent for {category:?}"
            );
            assert_ne!(category.parent_id, category.id);
        }
        let names: HashSet<&str> = tree.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names.len(), tree.len(), "duplicate names in {tree:?}");
    }

    #[test]
    fn electronics_example_builds_four_nodes() {
        let tree = build_category_tree(&paths(&[
            "Electrónica->Audio->Auriculares*",
            "Electrónica->Video",
        ]));
        let rows: Vec<(u32, &str, &str, u32)> = tree
            .categories()
            .iter()
            .map(|c| (c.id, c.name.as_str(), c.slug.as_str(), c.parent_id))
            .collect();
        assert_eq!(
            rows,
            vec![
                (1, "Electrónica", "electronica", 0),
                (2, "Audio", "electronica-audio", 1),
                (3, "Auriculares", "electronica-audio-auriculares", 2),
                (4, "Video", "electronica-video", 1),
            ]
        );
        assert_eq!(tree.categories()[2].description, "Productos de Auriculares");
        assert_tree_invariants(&tree);
    }

    #[test]
    fn invariants_hold_across_assorted_inputs() {
        let sets: [&[&str]; 4] = [
            &[],
            &["Hogar", "Hogar->Cocina", "Hogar->Cocina->* Sartenes", "Oficina->Papel"],
            &["8.1. Redes->Routers", "Redes->Switches", "Cables->Redes->UTP"],
            &["A->B->C", "C->B->A", "B", "A->A"],
        ];
        for set in sets {
            let tree = build_category_tree(&paths(set));
            assert_tree_invariants(&tree);
        }
    }

    #[test]
    fn distinct_cleaned_names_match_row_count() {
        let input = paths(&["Audio*->Parlantes", "Audio->Parlantes", "  Audio ->Micrófonos"]);
        let tree = build_category_tree(&input);
        let distinct: HashSet<String> = input
            .iter()
            .flat_map(|p| p.labels().iter().map(|l| clean_category_name(l)))
            .collect();
        assert_eq!(distinct.len(), tree.len());
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn shared_leaf_label_collapses_into_first_branch() {
        // Identity is keyed by cleaned name only: "Accesorios" under Audio and
        // under Video is one node parented where it first appeared.
        let tree = build_category_tree(&paths(&[
            "Audio->Accesorios",
            "Video->Accesorios->Soportes",
        ]));
        assert_eq!(tree.len(), 4);
        let accesorios = tree.get(tree.id_of("Accesorios").unwrap()).unwrap();
        assert_eq!(accesorios.parent_id, tree.id_of("Audio").unwrap());
        assert_eq!(accesorios.slug, "audio-accesorios");
        let soportes = tree.get(tree.id_of("Soportes").unwrap()).unwrap();
        assert_eq!(soportes.parent_id, accesorios.id);
        assert_eq!(soportes.slug, "video-accesorios-soportes");
    }

    #[test]
    fn empty_labels_are_skipped() {
        let noisy = CategoryPath::from_labels(["***", "Audio"]).unwrap();
        let blank = CategoryPath::from_labels(["* *"]).unwrap();
        let tree = build_category_tree(&[blank, noisy]);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.categories()[0].name, "Audio");
        assert!(tree.categories()[0].is_root());
        assert_eq!(tree.categories()[0].slug, "audio");
    }

    #[test]
    fn unique_paths_keep_first_seen_order() {
        let deduped = unique_paths(paths(&["B->C", "A", "B->C", "A", "D"]));
        let canon: Vec<String> = deduped.iter().map(CategoryPath::canonical).collect();
        assert_eq!(canon, vec!["B->C", "A", "D"]);
    }

    #[test]
    fn lineage_walks_to_root() {
        let tree = build_category_tree(&paths(&["Electrónica->Audio->Auriculares"]));
        let names: Vec<&str> = tree
            .lineage(tree.id_of("Auriculares*").unwrap())
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Electrónica", "Audio", "Auriculares"]);
        assert!(tree.lineage(99).is_empty());
        assert!(tree.get(0).is_none());
    }
}
