use indexmap::IndexMap;
use thiserror::Error;

use super::{Catalog, PackageKey};
use crate::install::InstallationJob;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionState {
    pub selected: bool,
    pub size: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("Unknown package: {0}")]
    UnknownPackage(String),
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

/// Which catalog packages the user picked.
///
/// Built from a catalog with nothing selected. A run never reads this
/// directly; it takes an [`InstallationJob`] snapshot via [`SelectionSet::snapshot`].
#[derive(Debug, Clone, Default)]
pub struct SelectionSet {
    states: IndexMap<PackageKey, SelectionState>,
}

impl SelectionSet {
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let states = catalog
            .entries()
            .map(|(key, entry)| {
                (
                    key,
                    SelectionState {
                        selected: false,
                        size: entry.size,
                    },
                )
            })
            .collect();
        Self { states }
    }

    pub fn set_selected(&mut self, key: &PackageKey, selected: bool) -> Result<(), SelectionError> {
        let state = self
            .states
            .get_mut(key)
            .ok_or_else(|| SelectionError::UnknownPackage(key.to_string()))?;
        state.selected = selected;
        Ok(())
    }

    pub fn is_selected(&self, key: &PackageKey) -> bool {
        self.states.get(key).is_some_and(|s| s.selected)
    }

    /// Select every package in `category`, or deselect them all if they
    /// already were all selected. Returns the new selected state.
    pub fn toggle_category(&mut self, category: &str) -> Result<bool, SelectionError> {
        let mut in_category = self
            .states
            .iter_mut()
            .filter(|(key, _)| key.category == category)
            .map(|(_, state)| state)
            .peekable();
        if in_category.peek().is_none() {
            return Err(SelectionError::UnknownCategory(category.to_string()));
        }

        let states: Vec<&mut SelectionState> = in_category.collect();
        let target = !states.iter().all(|s| s.selected);
        for state in states {
            state.selected = target;
        }
        Ok(target)
    }

    /// Same as [`Self::toggle_category`] across the whole catalog.
    pub fn toggle_all(&mut self) -> bool {
        let target = !self.states.values().all(|s| s.selected);
        for state in self.states.values_mut() {
            state.selected = target;
        }
        target
    }

    pub fn selected_keys(&self) -> impl Iterator<Item = &PackageKey> {
        self.states
            .iter()
            .filter(|(_, state)| state.selected)
            .map(|(key, _)| key)
    }

    pub fn selected_count(&self) -> usize {
        self.selected_keys().count()
    }

    pub fn estimated_size_mb(&self) -> u64 {
        self.states
            .values()
            .filter(|s| s.selected)
            .map(|s| s.size)
            .fold(0, u64::saturating_add)
    }

    /// Freeze the current selection into an immutable work list.
    ///
    /// Keys no longer present in `catalog` are skipped.
    pub fn snapshot(&self, catalog: &Catalog) -> InstallationJob {
        let items = self
            .selected_keys()
            .filter_map(|key| catalog.get(key).map(|entry| (key.clone(), entry.clone())))
            .collect();
        InstallationJob::new(items)
    }
}

/// Human-readable size: `N MB` below 1000 MB, `X.Y GB` from there on.
pub fn format_size(size_mb: u64) -> String {
    if size_mb < 1000 {
        format!("{size_mb} MB")
    } else {
        format!("{:.1} GB", size_mb as f64 / 1000.0)
    }
}
