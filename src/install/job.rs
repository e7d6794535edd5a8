use crate::catalog::{PackageKey, PackageManifestEntry};

/// Ordered work list for one orchestration run.
///
/// Taken from the selection when the run starts and owned by the run task;
/// later edits to the selection cannot reach it.
#[derive(Debug, Clone, Default)]
pub struct InstallationJob {
    items: Vec<(PackageKey, PackageManifestEntry)>,
}

impl InstallationJob {
    pub fn new(items: Vec<(PackageKey, PackageManifestEntry)>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[(PackageKey, PackageManifestEntry)] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_size_mb(&self) -> u64 {
        self.items
            .iter()
            .map(|(_, entry)| entry.size)
            .fold(0, u64::saturating_add)
    }
}
