use crate::catalog::Asset;

/// Assets the user has picked, in the order they were picked
///
/// Unique by asset id. Owned by the host view; children only read it and
/// report toggles back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    assets: Vec<Asset>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a toggle reported by the hub: `selected` is the desired state
    pub fn toggle(&mut self, asset: &Asset, selected: bool) {
        if selected {
            if !self.contains(&asset.id) {
                self.assets.push(asset.clone());
            }
        } else {
            self.assets.retain(|a| a.id != asset.id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.assets.iter().any(|a| a.id == id)
    }

    pub fn clear(&mut self) {
        self.assets.clear();
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    #[test]
    fn test_select_then_deselect_restores_prior_state() {
        let catalog = Catalog::builtin();
        let mut selection = Selection::new();
        selection.toggle(&catalog.assets()[0], true);
        let before = selection.clone();

        selection.toggle(&catalog.assets()[3], true);
        selection.toggle(&catalog.assets()[3], false);

        assert_eq!(selection, before);
    }

    #[test]
    fn test_selecting_twice_keeps_one_entry() {
        let catalog = Catalog::builtin();
        let mut selection = Selection::new();
        selection.toggle(&catalog.assets()[1], true);
        selection.toggle(&catalog.assets()[1], true);
        assert_eq!(selection.len(), 1);
    }

    #[test]
    fn test_same_name_different_id_are_distinct() {
        let catalog = Catalog::builtin();
        let mut selection = Selection::new();
        selection.toggle(catalog.get("1").unwrap(), true);
        selection.toggle(catalog.get("6").unwrap(), true);
        assert_eq!(selection.len(), 2);

        selection.toggle(catalog.get("1").unwrap(), false);
        assert!(!selection.contains("1"));
        assert!(selection.contains("6"));
    }

    #[test]
    fn test_preserves_pick_order_and_clear() {
        let catalog = Catalog::builtin();
        let mut selection = Selection::new();
        selection.toggle(catalog.get("5").unwrap(), true);
        selection.toggle(catalog.get("2").unwrap(), true);
        let ids: Vec<&str> = selection.assets().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["5", "2"]);

        selection.clear();
        assert!(selection.is_empty());
    }
}
