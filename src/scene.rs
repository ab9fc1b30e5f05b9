//! JSON scene description
//!
//! Stands in for a host document: a list of `{node, type, path}` references
//! kept in a JSON file. Updates rewrite the file in place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::Result;
use crate::host::{SceneOperations, SceneReference};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SceneDocument {
    #[serde(default)]
    references: Vec<SceneReference>,
}

/// A scene stored as JSON on disk
#[derive(Debug, Clone)]
pub struct JsonSceneFile {
    path: PathBuf,
}

impl JsonSceneFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<SceneDocument> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, document: &SceneDocument) -> Result<()> {
        fs::write(&self.path, serde_json::to_string_pretty(document)?)?;
        Ok(())
    }
}

impl SceneOperations for JsonSceneFile {
    fn scan_scene(&mut self) -> Result<Vec<SceneReference>> {
        Ok(self.read()?.references)
    }

    fn update(&mut self, items: &[SceneReference]) -> Result<()> {
        let mut document = self.read()?;
        let mut changed = 0;
        for item in items {
            for reference in document
                .references
                .iter_mut()
                .filter(|r| r.node == item.node && r.node_type == item.node_type)
            {
                reference.path = item.path.clone();
                changed += 1;
            }
        }
        self.write(&document)?;
        info!(scene = %self.path.display(), changed, "scene updated");
        Ok(())
    }
}
