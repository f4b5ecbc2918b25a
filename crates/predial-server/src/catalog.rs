/// Loader and lookups for the building-maintenance catalog.
///
/// The data blob is a JSON object of categories, each holding an object of systems.
/// Object key order in the file is the catalog order and drives every listing, label
/// and report built from it. The catalog is immutable once loaded.
///
/// Inconsistent data (duplicate system keys, dangling typology links, repeated titles)
/// is logged and tolerated; only malformed JSON fails the load.
use std::collections::HashSet;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::{keyed_entries, Category, Pathology, ScheduleEntry, System};

/// Default data set compiled into the binary.
pub const EMBEDDED_CATALOG: &str = include_str!("../data/catalog.json");

#[derive(Debug)]
pub struct Catalog {
    categories: Vec<Category>,
    pathologies: Vec<Pathology>,
    version: String,
}

impl Catalog {
    /// Parse a catalog blob. The version is the SHA-256 of `content`.
    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let mut de = serde_json::Deserializer::from_str(content);
        let categories: Vec<Category> = keyed_entries(&mut de).map_err(malformed)?;
        de.end().map_err(malformed)?;

        warn_inconsistencies(&categories);

        let pathologies = categories
            .iter()
            .flat_map(|c| &c.systems)
            .flat_map(|s| s.pathologies.iter().cloned())
            .collect();

        Ok(Self {
            categories,
            pathologies,
            version: format!("{:x}", Sha256::digest(content.as_bytes())),
        })
    }

    /// Load from `path`, or the embedded data set when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let catalog = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                Self::from_json(&content)?
            }
            None => Self::from_json(EMBEDDED_CATALOG)?,
        };
        info!(
            source = path.map_or("embedded".to_string(), |p| p.display().to_string()),
            version = %catalog.version,
            categories = catalog.categories.len(),
            systems = catalog.systems().count(),
            pathologies = catalog.pathologies.len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// All categories in catalog order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn category(&self, key: &str) -> Option<&Category> {
        self.categories.iter().find(|c| c.key == key)
    }

    /// Every system in catalog order.
    pub fn systems(&self) -> impl Iterator<Item = &System> {
        self.categories.iter().flat_map(|c| c.systems.iter())
    }

    /// First system with `key`, with its owning category.
    pub fn system_with_category(&self, key: &str) -> Option<(&Category, &System)> {
        self.categories
            .iter()
            .find_map(|c| c.systems.iter().find(|s| s.key == key).map(|s| (c, s)))
    }

    pub fn system(&self, key: &str) -> Option<&System> {
        self.system_with_category(key).map(|(_, s)| s)
    }

    pub fn find_pathologies_by_system(&self, system_key: &str) -> &[Pathology] {
        self.system(system_key)
            .map(|s| s.pathologies.as_slice())
            .unwrap_or(&[])
    }

    pub fn find_schedule_by_typology(
        &self,
        system_key: &str,
        typology_title: &str,
    ) -> &[ScheduleEntry] {
        self.system(system_key)
            .map(|s| s.schedule_for(typology_title))
            .unwrap_or(&[])
    }

    pub fn find_pathology(&self, system_key: &str, title: &str) -> Option<&Pathology> {
        self.system(system_key).and_then(|s| s.pathology(title))
    }

    /// Every pathology, flattened in catalog order.
    pub fn all_pathologies(&self) -> &[Pathology] {
        &self.pathologies
    }
}

fn malformed(e: serde_json::Error) -> AppError {
    AppError::Catalog(format!("malformed catalog JSON: {e}"))
}

fn warn_inconsistencies(categories: &[Category]) {
    let mut system_keys = HashSet::new();
    for category in categories {
        for system in &category.systems {
            if !system_keys.insert(system.key.as_str()) {
                warn!(
                    category = %category.key,
                    system = %system.key,
                    "duplicate system key, lookups resolve to the first occurrence"
                );
            }

            let mut titles = HashSet::new();
            for typology in &system.typologies {
                if !titles.insert(typology.title.as_str()) {
                    warn!(system = %system.key, typology = %typology.title, "duplicate typology title");
                }
            }

            let mut pathology_titles = HashSet::new();
            for pathology in &system.pathologies {
                if !pathology_titles.insert(pathology.title.as_str()) {
                    warn!(system = %system.key, pathology = %pathology.title, "duplicate pathology title");
                }
                if !pathology.typology_link.is_empty() && system.typology_for(pathology).is_none() {
                    warn!(
                        system = %system.key,
                        pathology = %pathology.title,
                        link = %pathology.typology_link,
                        "pathology links to an unknown typology"
                    );
                }
            }

            for schedule_key in system.maintenance_schedules.keys() {
                if system.typology(schedule_key).is_none() {
                    warn!(system = %system.key, typology = %schedule_key, "schedule for unknown typology");
                }
            }
        }
    }
}
