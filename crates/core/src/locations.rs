use crate::error::ConfigError;
use crate::models::{Language, Location};
use std::fs;
use std::path::Path;

/// Read-only table of campus locations, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct LocationTable {
    locations: Vec<Location>,
}

impl LocationTable {
    pub fn new(locations: Vec<Location>) -> Self {
        Self { locations }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let locations: Vec<Location> = serde_json::from_str(raw)?;
        if let Some(location) = locations.iter().find(|location| location.id.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "location {:?} has an empty id",
                location.name
            )));
        }
        Ok(Self::new(locations))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn get(&self, id: &str) -> Option<&Location> {
        self.locations.iter().find(|location| location.id == id)
    }

    /// Korean uses the native name, every other language the English one.
    /// Falls back to whichever name is present.
    pub fn display_name(&self, id: &str, language: Language) -> Option<&str> {
        let location = self.get(id)?;
        let (preferred, fallback) = if language == Language::Korean {
            (&location.name, &location.name_en)
        } else {
            (&location.name_en, &location.name)
        };

        if !preferred.trim().is_empty() {
            Some(preferred.as_str())
        } else if !fallback.trim().is_empty() {
            Some(fallback.as_str())
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Location> {
        self.locations.iter()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
