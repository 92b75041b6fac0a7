//! `manga_id_map.json`: destination manga ids to source-side ids

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use super::error::{ExtensionError, ExtensionResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum SourceIds {
    One(String),
    Many(Vec<String>),
}

impl SourceIds {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(id) => vec![id],
            Self::Many(ids) => ids,
        }
    }
}

/// Mapping from destination manga id to the source ids it mirrors
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MangaIdMap {
    by_md: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    by_source: HashMap<String, String>,
}

impl MangaIdMap {
    /// Parse from JSON text; values may be a single id or a list
    pub fn from_json(json: &str) -> Result<Self, String> {
        let raw: BTreeMap<String, SourceIds> =
            serde_json::from_str(json).map_err(|e| e.to_string())?;

        let mut map = Self::default();
        for (md_id, ids) in raw {
            map.insert(md_id, ids.into_vec())?;
        }
        Ok(map)
    }

    /// Load from file; a missing file yields an empty map
    pub fn load(path: impl AsRef<Path>) -> ExtensionResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let to_error = |reason: String| ExtensionError::MangaIdMap {
            path: path.display().to_string(),
            reason,
        };
        let json = std::fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;
        Self::from_json(&json).map_err(to_error)
    }

    /// Add a mapping; a source id may belong to one destination id only
    pub fn insert(&mut self, md_id: String, source_ids: Vec<String>) -> Result<(), String> {
        for source_id in &source_ids {
            if let Some(existing) = self.by_source.get(source_id) {
                if existing != &md_id {
                    return Err(format!(
                        "source id {source_id} mapped to both {existing} and {md_id}"
                    ));
                }
            }
            self.by_source.insert(source_id.clone(), md_id.clone());
        }
        self.by_md.entry(md_id).or_default().extend(source_ids);
        Ok(())
    }

    /// Destination manga id for a source id
    pub fn md_id_for(&self, source_id: &str) -> Option<&str> {
        self.by_source.get(source_id).map(String::as_str)
    }

    pub fn source_ids(&self, md_id: &str) -> &[String] {
        self.by_md.get(md_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Tracked destination ids, sorted
    pub fn tracked_ids(&self) -> Vec<String> {
        self.by_md.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.by_md.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_md.is_empty()
    }
}
