use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use predial_common::mcp_api::{
    DiagnosticInfo, PathologyInfo, ScheduleEntryInfo, TechnologyInfo, TypologyInfo,
    TypologyOption,
};
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;

/// A top-level catalog group, e.g. "Estrutura & Envoltória".
#[derive(Debug, Clone, Deserialize)]
pub struct Category {
    /// Object key in the data blob, e.g. "estrutura".
    #[serde(skip)]
    pub key: String,
    pub title: String,
    /// Systems in declared order.
    #[serde(deserialize_with = "keyed_entries")]
    pub systems: Vec<System>,
}

/// A building system such as waterproofing or fire protection.
#[derive(Debug, Clone, Deserialize)]
pub struct System {
    #[serde(skip)]
    pub key: String,
    pub title: String,
    #[serde(default)]
    pub icon: String,
    #[serde(rename = "tipologias", default)]
    pub typologies: Vec<Typology>,
    #[serde(rename = "patologias", default)]
    pub pathologies: Vec<Pathology>,
    #[serde(rename = "diagnostico", default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(rename = "tecnologias", default)]
    pub technologies: Vec<Technology>,
    /// Schedule entries keyed by typology title.
    #[serde(default)]
    pub maintenance_schedules: HashMap<String, Vec<ScheduleEntry>>,
}

/// A constructive variant of a system, e.g. "Cobertura" for waterproofing.
#[derive(Debug, Clone, Deserialize)]
pub struct Typology {
    pub title: String,
    #[serde(rename = "definicao", default)]
    pub definition: String,
    #[serde(rename = "componentes", default)]
    pub components: String,
    #[serde(rename = "aplicacoes", default)]
    pub applications: String,
    #[serde(rename = "vantagens", default)]
    pub advantages: String,
    #[serde(rename = "desvantagens", default)]
    pub disadvantages: String,
}

/// A known failure mode. `typology_link` names a typology title of the same system
/// and may be empty or dangling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Pathology {
    pub title: String,
    #[serde(rename = "sintomas", default)]
    pub symptoms: String,
    #[serde(default)]
    pub typology_link: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Diagnostic {
    pub title: String,
    #[serde(rename = "desc", default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Technology {
    #[serde(default)]
    pub icon: String,
    pub title: String,
    #[serde(rename = "desc", default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleEntry {
    /// "Preventiva", "Preditiva"...
    #[serde(rename = "type", default)]
    pub kind: String,
    pub activity: String,
    #[serde(default)]
    pub periodicity: String,
    #[serde(default)]
    pub recommendations: String,
    #[serde(default)]
    pub tech_diagnostics: String,
}

/// Checkbox id of a typology: lower-cased title with spaces replaced by hyphens.
pub fn typology_id(title: &str) -> String {
    title.to_lowercase().replace(' ', "-")
}

impl Typology {
    pub fn id(&self) -> String {
        typology_id(&self.title)
    }
}

impl System {
    pub fn typology(&self, title: &str) -> Option<&Typology> {
        self.typologies.iter().find(|t| t.title == title)
    }

    pub fn typology_by_id(&self, id: &str) -> Option<&Typology> {
        self.typologies.iter().find(|t| t.id() == id)
    }

    pub fn pathology(&self, title: &str) -> Option<&Pathology> {
        self.pathologies.iter().find(|p| p.title == title)
    }

    /// Resolve the soft link of `pathology`. Empty or unmatched links give `None`.
    pub fn typology_for(&self, pathology: &Pathology) -> Option<&Typology> {
        if pathology.typology_link.is_empty() {
            return None;
        }
        self.typology(&pathology.typology_link)
    }

    /// Typologies in declared order with their linked pathologies. Typologies without
    /// pathologies are dropped; `filter` keeps only the typology with that title.
    pub fn typologies_with_pathologies(
        &self,
        filter: Option<&str>,
    ) -> Vec<(&Typology, Vec<&Pathology>)> {
        self.typologies
            .iter()
            .filter(|t| filter.map_or(true, |f| f.is_empty() || t.title == f))
            .filter_map(|t| {
                let linked: Vec<&Pathology> = self
                    .pathologies
                    .iter()
                    .filter(|p| p.typology_link == t.title)
                    .collect();
                (!linked.is_empty()).then_some((t, linked))
            })
            .collect()
    }

    /// Typologies that have at least one linked pathology.
    pub fn typology_filters(&self) -> Vec<&Typology> {
        self.typologies
            .iter()
            .filter(|t| self.pathologies.iter().any(|p| p.typology_link == t.title))
            .collect()
    }

    pub fn schedule_for(&self, typology_title: &str) -> &[ScheduleEntry] {
        self.maintenance_schedules
            .get(typology_title)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

/// Entries of a JSON object whose keys become the entries' `key` field.
pub trait Keyed {
    fn set_key(&mut self, key: String);
}

impl Keyed for Category {
    fn set_key(&mut self, key: String) {
        self.key = key;
    }
}

impl Keyed for System {
    fn set_key(&mut self, key: String) {
        self.key = key;
    }
}

/// Deserialize a JSON object into a `Vec` keeping the object's key order.
pub fn keyed_entries<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Keyed,
{
    struct KeyedVisitor<T>(PhantomData<T>);

    impl<'de, T> Visitor<'de> for KeyedVisitor<T>
    where
        T: Deserialize<'de> + Keyed,
    {
        type Value = Vec<T>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("an object of keyed entries")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Vec<T>, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((key, mut value)) = map.next_entry::<String, T>()? {
                value.set_key(key);
                entries.push(value);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(KeyedVisitor(PhantomData))
}

// --- Conversions into tool responses ---

impl From<&Typology> for TypologyInfo {
    fn from(t: &Typology) -> Self {
        Self {
            title: t.title.clone(),
            definition: t.definition.clone(),
            components: t.components.clone(),
            applications: t.applications.clone(),
            advantages: t.advantages.clone(),
            disadvantages: t.disadvantages.clone(),
        }
    }
}

impl From<&Typology> for TypologyOption {
    fn from(t: &Typology) -> Self {
        Self {
            id: t.id(),
            title: t.title.clone(),
        }
    }
}

impl From<&Pathology> for PathologyInfo {
    fn from(p: &Pathology) -> Self {
        Self {
            title: p.title.clone(),
            symptoms: p.symptoms.clone(),
            typology_link: p.typology_link.clone(),
        }
    }
}

impl From<&Diagnostic> for DiagnosticInfo {
    fn from(d: &Diagnostic) -> Self {
        Self {
            title: d.title.clone(),
            description: d.description.clone(),
        }
    }
}

impl From<&Technology> for TechnologyInfo {
    fn from(t: &Technology) -> Self {
        Self {
            icon: t.icon.clone(),
            title: t.title.clone(),
            description: t.description.clone(),
        }
    }
}

impl From<&ScheduleEntry> for ScheduleEntryInfo {
    fn from(e: &ScheduleEntry) -> Self {
        Self {
            kind: e.kind.clone(),
            activity: e.activity.clone(),
            periodicity: e.periodicity.clone(),
            recommendations: e.recommendations.clone(),
            tech_diagnostics: e.tech_diagnostics.clone(),
        }
    }
}
