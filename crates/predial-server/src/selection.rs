use std::collections::{HashMap, HashSet};

use crate::catalog::Catalog;
use crate::model::{System, Typology};

/// Checked (system, typology) pairs of one workflow.
///
/// Leaves are keyed by system key then typology id. Unknown keys are stored as given
/// and skipped when the selection is walked against the catalog.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    checked: HashMap<String, HashMap<String, bool>>,
}

impl Selection {
    pub fn set_checked(&mut self, system_key: &str, typology_id: &str, checked: bool) {
        self.checked
            .entry(system_key.to_string())
            .or_default()
            .insert(typology_id.to_string(), checked);
    }

    pub fn is_checked(&self, system_key: &str, typology_id: &str) -> bool {
        self.checked
            .get(system_key)
            .and_then(|leaves| leaves.get(typology_id))
            .copied()
            .unwrap_or(false)
    }

    pub fn is_any_selected(&self) -> bool {
        self.checked.values().flat_map(|l| l.values()).any(|&c| c)
    }

    /// Checked pairs in catalog order, whatever order they were toggled in.
    pub fn selected_pairs<'c>(&self, catalog: &'c Catalog) -> Vec<(&'c System, &'c Typology)> {
        let mut seen = HashSet::new();
        catalog
            .systems()
            .filter(|s| seen.insert(s.key.as_str()))
            .flat_map(|s| s.typologies.iter().map(move |t| (s, t)))
            .filter(|(s, t)| self.is_checked(&s.key, &t.id()))
            .collect()
    }

    /// "System: Typology" labels in catalog order.
    pub fn flatten_selected_labels(&self, catalog: &Catalog) -> Vec<String> {
        self.selected_pairs(catalog)
            .into_iter()
            .map(|(s, t)| format!("{}: {}", s.title, t.title))
            .collect()
    }

    pub fn reset(&mut self) {
        self.checked.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EMBEDDED_CATALOG;

    fn catalog() -> Catalog {
        Catalog::from_json(EMBEDDED_CATALOG).expect("embedded catalog")
    }

    #[test]
    fn test_labels_follow_catalog_order_not_toggle_order() {
        let catalog = catalog();
        let mut forward = Selection::default();
        forward.set_checked("impermeabilizacao", "cobertura", true);
        forward.set_checked("fachadas", "pintura-externa", true);
        forward.set_checked("incendio", "extintores", true);

        let mut backward = Selection::default();
        backward.set_checked("incendio", "extintores", true);
        backward.set_checked("fachadas", "pintura-externa", true);
        backward.set_checked("impermeabilizacao", "cobertura", true);

        let expected = vec![
            "Impermeabilização: Cobertura".to_string(),
            "Fachadas: Pintura Externa".to_string(),
            "Prevenção e Combate a Incêndio: Extintores".to_string(),
        ];
        assert_eq!(forward.flatten_selected_labels(&catalog), expected);
        assert_eq!(backward.flatten_selected_labels(&catalog), expected);
    }

    #[test]
    fn test_uncheck_restores_empty_selection() {
        let mut selection = Selection::default();
        assert!(!selection.is_any_selected());
        selection.set_checked("fachadas", "pintura-externa", true);
        assert!(selection.is_any_selected());
        selection.set_checked("fachadas", "pintura-externa", false);
        assert!(!selection.is_any_selected());
    }

    #[test]
    fn test_set_checked_is_idempotent() {
        let mut selection = Selection::default();
        selection.set_checked("fachadas", "pintura-externa", true);
        selection.set_checked("fachadas", "pintura-externa", true);
        assert_eq!(selection.flatten_selected_labels(&catalog()).len(), 1);
    }

    #[test]
    fn test_orphan_ids_are_skipped() {
        let catalog = catalog();
        let mut selection = Selection::default();
        selection.set_checked("inexistente", "cobertura", true);
        selection.set_checked("fachadas", "inexistente", true);
        assert!(selection.is_any_selected());
        assert!(selection.flatten_selected_labels(&catalog).is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut selection = Selection::default();
        selection.set_checked("fachadas", "pintura-externa", true);
        selection.reset();
        assert!(!selection.is_any_selected());
        assert!(!selection.is_checked("fachadas", "pintura-externa"));
    }
}
