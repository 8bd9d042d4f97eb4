/// Site catalog and selection state.
///
/// Holds the most recent catalog response and the set of selected site
/// names. The selection is always a subset of the catalog: every refresh
/// prunes names the new catalog no longer lists, and selecting an unknown
/// name is a no-op.

use crate::model::Site;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct SiteCatalog {
    sites: Vec<Site>,
    selected: BTreeSet<String>,
}

impl SiteCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sites.iter().any(|s| s.name == name)
    }

    pub fn is_selected(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Installs a refreshed catalog and drops selected names it no longer lists.
    ///
    /// Returns the names that were dropped, in sorted order.
    pub fn replace_sites(&mut self, sites: Vec<Site>) -> Vec<String> {
        self.sites = sites;
        let dropped: Vec<String> = self
            .selected
            .iter()
            .filter(|name| !self.sites.iter().any(|s| &s.name == *name))
            .cloned()
            .collect();
        for name in &dropped {
            self.selected.remove(name);
        }
        dropped
    }

    /// Replaces the selection wholesale, keeping only catalog members.
    pub fn set_selection<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selected = names
            .into_iter()
            .map(Into::into)
            .filter(|n| self.contains(n))
            .collect();
        self.selected = selected;
    }

    /// Flips one site's selection. Returns the new state, or `None` if the
    /// site is not in the catalog.
    pub fn toggle(&mut self, name: &str) -> Option<bool> {
        if !self.contains(name) {
            return None;
        }
        if self.selected.remove(name) {
            Some(false)
        } else {
            self.selected.insert(name.to_string());
            Some(true)
        }
    }

    /// Sites whose name contains `query`, ignoring case.
    pub fn filtered(&self, query: &str) -> Vec<&Site> {
        let needle = query.to_lowercase();
        self.sites
            .iter()
            .filter(|s| s.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Selects every site matching `query`; other selections are kept.
    pub fn select_all(&mut self, query: &str) {
        let names: Vec<String> = self.filtered(query).iter().map(|s| s.name.clone()).collect();
        self.selected.extend(names);
    }

    /// Deselects every site matching `query`; other selections are kept.
    pub fn deselect_all(&mut self, query: &str) {
        let names: Vec<String> = self.filtered(query).iter().map(|s| s.name.clone()).collect();
        for name in names {
            self.selected.remove(&name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(name: &str) -> Site {
        Site { name: name.to_string(), span: None }
    }

    fn catalog(names: &[&str]) -> SiteCatalog {
        let mut c = SiteCatalog::new();
        c.replace_sites(names.iter().map(|n| site(n)).collect());
        c
    }

    #[test]
    fn test_refresh_drops_selected_site_missing_from_catalog() {
        let mut c = catalog(&["X", "Y", "Z"]);
        c.set_selection(["X", "Y"]);

        let dropped = c.replace_sites(vec![site("Y"), site("Z")]);
        assert_eq!(dropped, vec!["X".to_string()]);
        assert!(!c.is_selected("X"));
        assert!(c.is_selected("Y"));
        assert!(c.selected().iter().all(|n| c.contains(n)));
    }

    #[test]
    fn test_unknown_site_cannot_be_selected() {
        let mut c = catalog(&["A"]);
        assert_eq!(c.toggle("B"), None);
        c.set_selection(["A", "B"]);
        assert_eq!(c.selected().len(), 1);
    }

    #[test]
    fn test_toggle_flips_selection() {
        let mut c = catalog(&["A"]);
        assert_eq!(c.toggle("A"), Some(true));
        assert_eq!(c.toggle("A"), Some(false));
        assert!(c.selected().is_empty());
    }

    #[test]
    fn test_select_all_and_deselect_all_respect_search() {
        let mut c = catalog(&["Polarstern_2019", "Polarstern_2020", "Meteor_2018"]);
        c.select_all("polar");
        assert_eq!(c.selected().len(), 2);
        assert!(!c.is_selected("Meteor_2018"));

        c.toggle("Meteor_2018");
        c.deselect_all("2019");
        assert!(c.is_selected("Polarstern_2020"));
        assert!(c.is_selected("Meteor_2018"));
        assert!(!c.is_selected("Polarstern_2019"));
    }
}
