//! Package catalog: categories of installable packages and their manifests.
//!
//! The catalog is fetched as a JSON document shaped like
//! `{category: {package: {description, size, icon, url?, installer?, managerCommand?}}}`
//! and is never mutated after parsing; a refresh replaces it wholesale.

pub mod cli;
mod fetch;
mod selection;

pub use fetch::{CatalogSource, fetch_catalog};
pub use selection::{SelectionSet, format_size};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Manager invocation value meaning "already part of the operating system".
pub const BUILTIN_SENTINEL: &str = "builtin";

const DEFAULT_SIZE_MB: u64 = 50;

fn default_size() -> u64 {
    DEFAULT_SIZE_MB
}

/// How to install one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifestEntry {
    /// Identifier, taken from the key in the catalog document
    #[serde(skip)]
    pub id: String,
    /// Optional display name; the identifier is shown when absent
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    /// Estimated size in MB
    #[serde(default = "default_size")]
    pub size: u64,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub installer: Option<String>,
    #[serde(default, alias = "manager_command")]
    pub manager_command: Option<String>,
}

impl PackageManifestEntry {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.id)
    }

    /// Manager invocation if it is usable, i.e. non-empty and not the builtin sentinel.
    pub fn usable_manager_command(&self) -> Option<&str> {
        self.manager_command
            .as_deref()
            .map(str::trim)
            .filter(|cmd| !cmd.is_empty() && !cmd.eq_ignore_ascii_case(BUILTIN_SENTINEL))
    }

    /// Download URL and installer filename if both are present.
    pub fn usable_download(&self) -> Option<(&str, &str)> {
        let url = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let installer = self
            .installer
            .as_deref()
            .map(str::trim)
            .filter(|i| !i.is_empty())?;
        Some((url, installer))
    }

    /// True when `text` occurs in the identifier, display name or description, ignoring case.
    pub fn matches(&self, text: &str) -> bool {
        let needle = text.to_lowercase();
        [self.id.as_str(), self.display_name(), self.description.as_str()]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    /// True when at least one install strategy could work for this entry.
    pub fn is_installable(&self) -> bool {
        self.usable_manager_command().is_some() || self.usable_download().is_some()
    }
}

/// Stable `category:identifier` key of a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackageKey {
    pub category: String,
    pub id: String,
}

impl PackageKey {
    pub fn new(category: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

impl FromStr for PackageKey {
    type Err = String;

    /// Splits on the first `:`; identifiers may themselves contain colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((category, id)) if !category.is_empty() && !id.is_empty() => {
                Ok(PackageKey::new(category, id))
            }
            _ => Err(format!("expected <category>:<package>, got '{s}'")),
        }
    }
}

/// All packages, grouped by category, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    categories: IndexMap<String, IndexMap<String, PackageManifestEntry>>,
}

impl Catalog {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut categories: IndexMap<String, IndexMap<String, PackageManifestEntry>> =
            serde_json::from_str(json)?;
        for packages in categories.values_mut() {
            for (id, entry) in packages.iter_mut() {
                entry.id = id.clone();
            }
        }
        Ok(Self { categories })
    }

    pub fn category_names(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn category(&self, name: &str) -> Option<&IndexMap<String, PackageManifestEntry>> {
        self.categories.get(name)
    }

    pub fn get(&self, key: &PackageKey) -> Option<&PackageManifestEntry> {
        self.categories.get(&key.category)?.get(&key.id)
    }

    /// Every package with its key, categories first-to-last.
    pub fn entries(&self) -> impl Iterator<Item = (PackageKey, &PackageManifestEntry)> {
        self.categories.iter().flat_map(|(category, packages)| {
            packages
                .iter()
                .map(move |(id, entry)| (PackageKey::new(category.as_str(), id.as_str()), entry))
        })
    }

    /// Packages in any category whose name or description contains `text`.
    pub fn search<'a>(&'a self, text: &'a str) -> impl Iterator<Item = (PackageKey, &'a PackageManifestEntry)> + 'a {
        self.entries().filter(move |(_, entry)| entry.matches(text))
    }

    /// Look a package up by bare identifier; `None` if missing or ambiguous.
    pub fn find_by_id(&self, id: &str) -> Option<PackageKey> {
        let mut matches = self
            .entries()
            .filter(|(key, _)| key.id.eq_ignore_ascii_case(id))
            .map(|(key, _)| key);
        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    pub fn len(&self) -> usize {
        self.categories.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
