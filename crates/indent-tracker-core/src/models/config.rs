//! Shared configuration documents: unit/category map and application info.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ValidationError;

/// Application name used until someone saves another one.
pub const DEFAULT_APP_NAME: &str = "AiPharmHSNI-Indent Tracking";

/// Built-in units and their categories, written on first run.
pub const DEFAULT_UNITS: &[(&str, &[&str])] = &[
    ("Farmasi Satelit 1", &["Floor Stock", "Troli Ubat", "Ubat Tambahan"]),
    ("Farmasi Satelit 2", &["Floor Stock", "Troli Ubat", "Ubat Tambahan"]),
    ("Farmasi Pengeluaran", &["Galenikal & Losyen", "Special Drip"]),
    ("Farmasi Stor Pukal 3", &["IV Drip"]),
    ("Farmasi Kecemasan", &["Ubat Urgent (AOH)"]),
];

/// Unit name → ordered category list, stored at `config/units`.
///
/// Saving replaces the whole document; there is no per-unit merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitConfig {
    units: BTreeMap<String, Vec<String>>,
}

impl UnitConfig {
    pub fn builtin() -> Self {
        let units = DEFAULT_UNITS
            .iter()
            .map(|(name, categories)| {
                (
                    name.to_string(),
                    categories.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        Self { units }
    }

    pub fn from_map(units: BTreeMap<String, Vec<String>>) -> Self {
        Self { units }
    }

    /// Unit names in display order.
    pub fn unit_names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn categories(&self, unit: &str) -> Option<&[String]> {
        self.units.get(unit).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.units.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// First unit, the default choice for a new entry.
    pub fn first_unit(&self) -> Option<&str> {
        self.unit_names().next()
    }

    /// Copy with `name` added or replaced, categories parsed from a
    /// comma-separated list.
    pub fn with_unit(&self, name: &str, categories_csv: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankUnitName);
        }
        let categories: Vec<String> = categories_csv
            .split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
            .collect();
        if categories.is_empty() {
            return Err(ValidationError::NoCategories(name.to_string()));
        }
        let mut next = self.clone();
        next.units.insert(name.to_string(), categories);
        Ok(next)
    }

    /// Copy without `name`. The last remaining unit cannot be removed.
    pub fn without_unit(&self, name: &str) -> Result<Self, ValidationError> {
        if !self.units.contains_key(name) {
            return Err(ValidationError::UnknownUnit(name.to_string()));
        }
        if self.units.len() <= 1 {
            return Err(ValidationError::LastUnit(name.to_string()));
        }
        let mut next = self.clone();
        next.units.remove(name);
        Ok(next)
    }
}

/// Application info stored at `config/appInfo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    #[serde(default)]
    pub name: String,
}

impl AppInfo {
    pub fn builtin() -> Self {
        Self {
            name: DEFAULT_APP_NAME.to_string(),
        }
    }

    /// Validated app info for saving; the name is trimmed and must not be blank.
    pub fn named(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::BlankAppName);
        }
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Name to show; an empty stored name falls back to the default.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            DEFAULT_APP_NAME
        } else {
            &self.name
        }
    }
}
