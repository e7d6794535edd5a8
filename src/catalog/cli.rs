use anyhow::{Context, Result, bail};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use serde_json::json;

use super::{
    BUILTIN_SENTINEL, Catalog, CatalogSource, PackageKey, PackageManifestEntry, fetch_catalog, format_size,
};
use crate::common::config::AppConfig;
use crate::ui::prelude::*;

/// Fetch the catalog from `source`, or from the configured URL.
pub async fn load_catalog(config: &AppConfig, source: Option<&str>) -> Result<Catalog> {
    let source = CatalogSource::parse(source.unwrap_or(&config.catalog_url));
    emit(
        Level::Debug,
        "catalog.fetch",
        &format!("{} Loading catalog from {source}", icon(NerdFont::Globe)),
        None,
    );

    let catalog = fetch_catalog(&source, config.timeouts.catalog())
        .await
        .with_context(|| format!("Could not load the package catalog from {source}"))?;

    if catalog.is_empty() {
        emit(
            Level::Warn,
            "catalog.empty",
            &format!("{} Catalog at {source} lists no packages", icon(NerdFont::Warning)),
            None,
        );
    }
    Ok(catalog)
}

/// Entries to list, narrowed by category and search text.
fn list_entries<'a>(
    catalog: &'a Catalog,
    category: Option<&str>,
    search: Option<&str>,
) -> Vec<(PackageKey, &'a PackageManifestEntry)> {
    catalog
        .entries()
        .filter(|(key, _)| category.is_none_or(|name| key.category == name))
        .filter(|(_, entry)| search.is_none_or(|text| entry.matches(text)))
        .collect()
}

/// Install methods an entry offers, as shown in listings.
fn methods(entry: &PackageManifestEntry) -> Vec<&'static str> {
    let mut methods = Vec::new();
    if entry.usable_manager_command().is_some() {
        methods.push("manager");
    }
    if entry.usable_download().is_some() {
        methods.push("direct");
    }
    if methods.is_empty()
        && entry
            .manager_command
            .as_deref()
            .is_some_and(|cmd| cmd.trim().eq_ignore_ascii_case(BUILTIN_SENTINEL))
    {
        methods.push(BUILTIN_SENTINEL);
    }
    methods
}

pub async fn handle_list(
    config: &AppConfig,
    source: Option<&str>,
    category: Option<&str>,
    search: Option<&str>,
) -> Result<()> {
    let catalog = load_catalog(config, source).await?;

    if let Some(name) = category {
        if catalog.category(name).is_none() {
            bail!("Unknown category '{name}'");
        }
    }

    let entries = list_entries(&catalog, category, search);

    if get_output_format() == OutputFormat::Json {
        let packages: Vec<_> = entries
            .iter()
            .map(|(key, entry)| {
                json!({
                    "key": key.to_string(),
                    "category": key.category,
                    "id": key.id,
                    "name": entry.display_name(),
                    "description": entry.description,
                    "size_mb": entry.size,
                    "methods": methods(entry),
                    "installable": entry.is_installable(),
                })
            })
            .collect();
        emit(
            Level::Info,
            "catalog.list",
            &format!("{} package(s)", packages.len()),
            Some(json!({ "packages": packages })),
        );
        return Ok(());
    }

    if let (Some(text), true) = (search, entries.is_empty()) {
        emit(
            Level::Info,
            "catalog.list.empty",
            &format!("{} No packages found matching '{text}'", icon(NerdFont::Info)),
            None,
        );
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Package", "Name", "Size", "Methods", "Description"]);

    for (key, entry) in &entries {
        let methods = methods(entry);
        table.add_row(vec![
            key.to_string(),
            entry.display_name().to_string(),
            format_size(entry.size),
            if methods.is_empty() {
                "-".to_string()
            } else {
                methods.join(", ")
            },
            entry.description.clone(),
        ]);
    }

    println!("{table}");
    let categories = if category.is_some() {
        1
    } else {
        catalog.category_names().count()
    };
    emit(
        Level::Info,
        "catalog.list.summary",
        &format!(
            "{} {} package(s) in {} categor{}",
            icon(NerdFont::Package),
            entries.len(),
            categories,
            if categories == 1 { "y" } else { "ies" }
        ),
        None,
    );
    Ok(())
}
