//! Ordered, deduplicated string lists persisted as a JSON array (model names,
//! MCP servers and similar catalogs).

use crate::CoreError;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct StringListStore {
    path: PathBuf,
}

impl StringListStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file reads as an empty list.
    pub fn load(&self) -> Result<Vec<String>, CoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CoreError::io(&self.path, err)),
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let items: Vec<String> = serde_json::from_str(&raw).map_err(|source| CoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        Ok(normalize(items))
    }

    pub fn save(&self, items: Vec<String>) -> Result<Vec<String>, CoreError> {
        if self.path.as_os_str().is_empty() {
            return Err(CoreError::EmptyPath);
        }
        let items = normalize(items);
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| CoreError::io(parent, err))?;
            }
        }
        let mut payload = serde_json::to_string_pretty(&items).map_err(|source| CoreError::Json {
            path: self.path.clone(),
            source,
        })?;
        payload.push('\n');
        std::fs::write(&self.path, payload).map_err(|err| CoreError::io(&self.path, err))?;
        Ok(items)
    }

    /// Returns `(added, already_present)`, both sorted.
    pub fn add(&self, values: &[String]) -> Result<(Vec<String>, Vec<String>), CoreError> {
        let mut current = self.load()?;
        let mut added = Vec::new();
        let mut existed = Vec::new();
        for value in normalize(values.to_vec()) {
            if current.contains(&value) {
                existed.push(value);
            } else {
                current.push(value.clone());
                added.push(value);
            }
        }
        if !added.is_empty() {
            self.save(current)?;
        }
        Ok((added, existed))
    }

    /// Returns `(removed, missing)`, both sorted.
    pub fn remove(&self, values: &[String]) -> Result<(Vec<String>, Vec<String>), CoreError> {
        let current = self.load()?;
        let wanted = normalize(values.to_vec());
        let (removed, missing): (Vec<String>, Vec<String>) =
            wanted.into_iter().partition(|value| current.contains(value));
        if !removed.is_empty() {
            let kept = current
                .into_iter()
                .filter(|value| !removed.contains(value))
                .collect();
            self.save(kept)?;
        }
        Ok((removed, missing))
    }
}

/// Trims, drops empties, deduplicates and sorts.
pub fn normalize(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
