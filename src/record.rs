//! Publish records and the record store contract

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::fs;

use crate::error::Result;

/// Reference to a linked entity (project, shot, task, publish type...)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityRef {
    pub fn new(entity_type: impl Into<String>, id: i64, name: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            id,
            name: Some(name.into()),
        }
    }
}

/// Stored location of a published file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishPath {
    pub local_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Entity type publishes are stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PublishEntityType {
    #[default]
    PublishedFile,
    /// Legacy schema, keyed by `tank_type`
    TankPublishedFile,
}

impl PublishEntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishEntityType::PublishedFile => "PublishedFile",
            PublishEntityType::TankPublishedFile => "TankPublishedFile",
        }
    }

    /// Field holding the publish type link
    pub fn type_field(&self) -> &'static str {
        match self {
            PublishEntityType::PublishedFile => "published_file_type",
            PublishEntityType::TankPublishedFile => "tank_type",
        }
    }

    /// Fields requested by the bulk scene lookup
    pub fn lookup_fields(&self) -> Vec<&'static str> {
        vec![
            "entity",
            "entity.Asset.sg_asset_type",
            "code",
            "image",
            "name",
            "task",
            "task.Task.step.Step.code",
            "version_number",
            "project",
            self.type_field(),
        ]
    }
}

/// Fields requested when listing the versions of one publish stream
pub const VERSION_FIELDS: &[&str] = &["path", "path_cache", "entity", "name", "version_number"];

/// One publish record as returned by the record store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version_number: Option<i64>,
    #[serde(default)]
    pub project: Option<EntityRef>,
    #[serde(default)]
    pub entity: Option<EntityRef>,
    #[serde(default)]
    pub task: Option<EntityRef>,
    #[serde(default)]
    pub published_file_type: Option<EntityRef>,
    #[serde(default)]
    pub tank_type: Option<EntityRef>,
    /// Thumbnail URL
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub path: Option<PublishPath>,
    #[serde(default)]
    pub path_cache: Option<String>,
    #[serde(default, rename = "entity.Asset.sg_asset_type")]
    pub asset_type: Option<String>,
    #[serde(default, rename = "task.Task.step.Step.code")]
    pub step_code: Option<String>,
}

impl VersionRecord {
    pub fn local_path(&self) -> Option<&str> {
        self.path.as_ref().map(|p| p.local_path.as_str())
    }

    /// Publish type link for the configured entity type
    pub fn publish_type(&self, entity_type: PublishEntityType) -> Option<&EntityRef> {
        match entity_type {
            PublishEntityType::PublishedFile => self.published_file_type.as_ref(),
            PublishEntityType::TankPublishedFile => self.tank_type.as_ref(),
        }
    }

    /// Filters selecting every version of the same publish stream
    pub fn identity_filters(&self, entity_type: PublishEntityType) -> Vec<Filter> {
        let link = |e: Option<&EntityRef>| e.map_or(Value::Null, |e| serde_json::json!(e));
        vec![
            Filter::is("project", link(self.project.as_ref())),
            Filter::is("entity", link(self.entity.as_ref())),
            Filter::is("task", link(self.task.as_ref())),
            Filter::is(entity_type.type_field(), link(self.publish_type(entity_type))),
            Filter::is("name", self.name.clone().map_or(Value::Null, Value::String)),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Is,
    IsNot,
}

/// One `[field, op, value]` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn is(field: impl Into<String>, value: Value) -> Self {
        Self { field: field.into(), op: FilterOp::Is, value }
    }

    /// Evaluate against a serialized record. Entity links compare by type and id.
    pub fn matches(&self, record: &Value) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        let equal = match (actual, &self.value) {
            (Value::Object(a), Value::Object(b)) => a.get("id") == b.get("id") && a.get("type") == b.get("type"),
            (a, b) => a == b,
        };
        match self.op {
            FilterOp::Is => equal,
            FilterOp::IsNot => !equal,
        }
    }
}

/// Remote publish database
pub trait RecordStore: Send + Sync {
    /// Records of `entity_type` matching every filter
    fn find(&self, entity_type: &str, filters: &[Filter], fields: &[&str]) -> Result<Vec<VersionRecord>>;

    /// Bulk lookup of publishes by normalized path, in a single round trip.
    /// Paths without a publish are absent from the result.
    fn find_publishes(&self, paths: &[String], fields: &[&str]) -> Result<HashMap<String, VersionRecord>>;
}

/// Record store held in memory, optionally loaded from a JSON array
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    entity_type: PublishEntityType,
    records: Vec<VersionRecord>,
}

impl InMemoryRecordStore {
    pub fn new(entity_type: PublishEntityType, records: Vec<VersionRecord>) -> Self {
        Self { entity_type, records }
    }

    pub fn load(path: impl AsRef<Path>, entity_type: PublishEntityType) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let records: Vec<VersionRecord> = serde_json::from_str(&content)?;
        Ok(Self::new(entity_type, records))
    }

    pub fn records(&self) -> &[VersionRecord] {
        &self.records
    }

    pub fn push(&mut self, record: VersionRecord) {
        self.records.push(record);
    }
}

impl RecordStore for InMemoryRecordStore {
    fn find(&self, entity_type: &str, filters: &[Filter], _fields: &[&str]) -> Result<Vec<VersionRecord>> {
        if entity_type != self.entity_type.as_str() {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for record in &self.records {
            let value = serde_json::to_value(record)?;
            if filters.iter().all(|f| f.matches(&value)) {
                found.push(record.clone());
            }
        }
        Ok(found)
    }

    fn find_publishes(&self, paths: &[String], _fields: &[&str]) -> Result<HashMap<String, VersionRecord>> {
        let mut found = HashMap::new();
        for path in paths {
            // Highest version wins when several publishes share a path
            let best = self
                .records
                .iter()
                .filter(|r| r.local_path() == Some(path.as_str()) || r.path_cache.as_deref() == Some(path.as_str()))
                .max_by_key(|r| r.version_number);
            if let Some(record) = best {
                found.insert(path.clone(), record.clone());
            }
        }
        Ok(found)
    }
}
