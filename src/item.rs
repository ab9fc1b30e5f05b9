//! Breakdown items
//!
//! One [`BreakdownItem`] per scene reference, rebuilt from scratch on every scan.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::fields::FieldSet;
use crate::record::VersionRecord;
use crate::template::Template;
use crate::version::{ItemStatus, LatestVersion, VersionKeys};

/// A scene reference after normalization
#[derive(Debug, Clone)]
pub struct AssetReference {
    pub node_name: String,
    pub node_type: String,
    pub raw_path: String,
    /// Canonical form used as the publish lookup and cache key
    pub normalized_path: String,
    pub template: Option<Arc<Template>>,
    /// Template fields with abstract keys stripped
    pub fields: Option<FieldSet>,
    /// Frame token replaced by the canonical placeholder
    pub sequence_token: Option<String>,
    /// Eye value replaced by the stereo wildcard
    pub eye_token: Option<String>,
}

impl AssetReference {
    pub fn is_template_backed(&self) -> bool {
        self.template.is_some() && self.fields.as_ref().is_some_and(|f| !f.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct BreakdownItem {
    pub reference: AssetReference,
    pub current_version: Option<i64>,
    pub latest_version: LatestVersion,
    pub status: ItemStatus,
    pub record: Option<VersionRecord>,
    pub update_path: Option<String>,
}

impl BreakdownItem {
    pub fn new(reference: AssetReference, record: Option<VersionRecord>, keys: &VersionKeys) -> Self {
        let from_fields = reference
            .fields
            .as_ref()
            .and_then(|f| f.get_int(keys.version_key_for(f)));
        let current_version = from_fields.or_else(|| record.as_ref().and_then(|r| r.version_number));

        Self {
            reference,
            current_version,
            latest_version: LatestVersion::Unresolved,
            status: ItemStatus::Unknown,
            record,
            update_path: None,
        }
    }

    pub fn node_name(&self) -> &str {
        &self.reference.node_name
    }

    /// Whether a latest version can be resolved at all
    pub fn is_resolvable(&self) -> bool {
        self.reference.is_template_backed() || self.record.is_some()
    }

    pub fn is_stale(&self) -> bool {
        self.status == ItemStatus::Stale
    }

    pub fn thumbnail_url(&self) -> Option<&str> {
        self.record.as_ref().and_then(|r| r.image.as_deref())
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            node: self.reference.node_name.clone(),
            node_type: self.reference.node_type.clone(),
            path: self.reference.raw_path.clone(),
            normalized_path: self.reference.normalized_path.clone(),
            template: self.reference.template.as_ref().map(|t| t.name().to_string()),
            current_version: self.current_version,
            latest_version: self.latest_version,
            status: self.status,
            publish_id: self.record.as_ref().map(|r| r.id),
            thumbnail: self.thumbnail_url().map(String::from),
            update_path: self.update_path.clone(),
        }
    }
}

/// Serializable view of an item for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub node: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub path: String,
    pub normalized_path: String,
    pub template: Option<String>,
    pub current_version: Option<i64>,
    pub latest_version: LatestVersion,
    pub status: ItemStatus,
    pub publish_id: Option<i64>,
    pub thumbnail: Option<String>,
    pub update_path: Option<String>,
}

/// Which statuses to list. Items still unknown are always listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusFilter {
    pub show_current: bool,
    pub show_stale: bool,
}

impl Default for StatusFilter {
    fn default() -> Self {
        Self { show_current: true, show_stale: true }
    }
}

impl StatusFilter {
    /// Hiding both means showing everything
    pub fn new(show_current: bool, show_stale: bool) -> Self {
        if !show_current && !show_stale {
            Self::default()
        } else {
            Self { show_current, show_stale }
        }
    }

    pub fn accepts(&self, status: ItemStatus) -> bool {
        match status {
            ItemStatus::Unknown => true,
            ItemStatus::Current => self.show_current,
            ItemStatus::Stale => self.show_stale,
        }
    }
}

/// Filtered listing of a scene's items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakdownReport {
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub stale: usize,
    pub items: Vec<ItemSummary>,
}

impl BreakdownReport {
    pub fn new(items: &[BreakdownItem], filter: StatusFilter) -> Self {
        Self {
            generated_at: Utc::now(),
            total: items.len(),
            stale: items.iter().filter(|i| i.is_stale()).count(),
            items: items
                .iter()
                .filter(|i| filter.accepts(i.status))
                .map(BreakdownItem::summary)
                .collect(),
        }
    }
}

/// Every out-of-date item, ready to hand to `apply_updates`
pub fn select_stale(items: &mut [BreakdownItem]) -> Vec<&mut BreakdownItem> {
    items.iter_mut().filter(|item| item.is_stale()).collect()
}
