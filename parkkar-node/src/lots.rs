//! Parking lot id → detector script table.

use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// Lots served by the production deployment.
const BUILTIN_LOTS: [(&str, &str); 4] = [
    ("5c88fa8cf4afda39709c2974", "cb_parking_detector.py"),
    ("5c88fa8cf4afda39709c2970", "chemistry_parking_detector.py"),
    ("661661e96104b67c07d092ec", "workshop_parking_detector.py"),
    ("68700289a320c9d36bd397a4", "kbh_parking_detector.py"),
];

#[derive(Debug, Clone)]
pub struct LotRegistry {
    scripts_dir: PathBuf,
    lots: BTreeMap<String, String>,
}

impl LotRegistry {
    pub fn new(scripts_dir: impl Into<PathBuf>, lots: BTreeMap<String, String>) -> Self {
        Self {
            scripts_dir: scripts_dir.into(),
            lots,
        }
    }

    pub fn builtin(scripts_dir: impl Into<PathBuf>) -> Self {
        let lots = BUILTIN_LOTS
            .iter()
            .map(|(id, script)| (id.to_string(), script.to_string()))
            .collect();
        Self::new(scripts_dir, lots)
    }

    /// Load `{ "<lot id>": "<script file>" }` from a JSON file.
    pub fn from_json_file(scripts_dir: impl Into<PathBuf>, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read lot table {:?}", path))?;
        let lots: BTreeMap<String, String> = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse lot table {:?}", path))?;
        Ok(Self::new(scripts_dir, lots))
    }

    /// Script for `lot_id`, relative to the project root.
    pub fn resolve(&self, lot_id: &str) -> Option<PathBuf> {
        self.lots.get(lot_id).map(|script| self.scripts_dir.join(script))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.lots.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }
}
