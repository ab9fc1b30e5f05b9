//! Version numbers and status

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::fields::FieldSet;

/// Outcome of a latest-version lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "version", rename_all = "snake_case")]
pub enum LatestVersion {
    /// Resolution has not run
    #[default]
    Unresolved,
    /// Resolution ran and found no versions at all
    NotFound,
    Value(i64),
}

impl LatestVersion {
    pub fn value(&self) -> Option<i64> {
        match self {
            LatestVersion::Value(v) => Some(*v),
            _ => None,
        }
    }

    /// Legacy `-1` encoding for anything without a value
    pub fn as_sentinel(&self) -> i64 {
        self.value().unwrap_or(-1)
    }

    /// Keep the higher of two observations
    pub fn observe(self, version: i64) -> Self {
        match self {
            LatestVersion::Value(v) if v >= version => self,
            _ => LatestVersion::Value(version),
        }
    }
}

impl fmt::Display for LatestVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LatestVersion::Unresolved => write!(f, "?"),
            LatestVersion::NotFound => write!(f, "none"),
            LatestVersion::Value(v) => write!(f, "v{:03}", v),
        }
    }
}

/// Tri-state freshness of a breakdown item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    Unknown,
    Current,
    Stale,
}

impl ItemStatus {
    pub fn classify(current: Option<i64>, latest: LatestVersion) -> Self {
        match (current, latest.value()) {
            (Some(current), Some(latest)) if current == latest => ItemStatus::Current,
            (Some(_), Some(_)) => ItemStatus::Stale,
            _ => ItemStatus::Unknown,
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ItemStatus::Unknown => "unknown",
            ItemStatus::Current => "current",
            ItemStatus::Stale => "stale",
        };
        f.write_str(label)
    }
}

/// Names of the template keys the breakdown treats specially
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionKeys {
    #[serde(default = "default_version_key")]
    pub version: String,
    /// Camera assets version on this key instead
    #[serde(default = "default_camera_version_key")]
    pub camera_version: String,
    #[serde(default = "default_eye_key")]
    pub eye: String,
    #[serde(default = "default_step_key")]
    pub step: String,
}

fn default_version_key() -> String {
    "version".to_string()
}

fn default_camera_version_key() -> String {
    "camera_version".to_string()
}

fn default_eye_key() -> String {
    "eye".to_string()
}

fn default_step_key() -> String {
    "Step".to_string()
}

impl Default for VersionKeys {
    fn default() -> Self {
        Self {
            version: default_version_key(),
            camera_version: default_camera_version_key(),
            eye: default_eye_key(),
            step: default_step_key(),
        }
    }
}

impl VersionKeys {
    /// Key holding the version for this field set
    pub fn version_key_for(&self, fields: &FieldSet) -> &str {
        if fields.contains(&self.camera_version) {
            &self.camera_version
        } else {
            &self.version
        }
    }

    /// Keys that vary between versions of one asset, on top of the template's abstract keys
    pub fn skip_keys_for(&self, fields: &FieldSet, abstract_keys: BTreeSet<String>) -> BTreeSet<String> {
        let mut skip = abstract_keys;
        skip.insert(self.version_key_for(fields).to_string());
        skip.insert(self.eye.clone());
        if fields.contains(&self.camera_version) {
            skip.insert(self.version.clone());
            skip.insert(self.step.clone());
        }
        skip
    }
}
