//! Status & Update Planning
//!
//! Classifies each [`BreakdownItem`] against its latest version and computes
//! the path a stale reference should be re-pointed at.

use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};

use tracing::{debug, info, warn};

use crate::error::{BreakdownError, Result};
use crate::host::{SceneHost, SceneReference};
use crate::item::BreakdownItem;
use crate::record::{VersionRecord, VERSION_FIELDS};
use crate::resolver::{VersionResolver, VersionSource};
use crate::sequence::{restore_sequence_token, DEFAULT_CANONICAL_TOKEN};
use crate::version::{ItemStatus, LatestVersion};

/// Version token in a path: `v` + digits after a separator
pub const DEFAULT_VERSION_PATTERN: &str = r"[/._]v(?P<version>\d+)";

/// Settings for update path computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSettings {
    /// Zero padding applied when substituting a version into a path.
    /// `0` keeps the width of the token already in the path.
    #[serde(default = "default_version_padding")]
    pub version_padding: usize,

    /// Placeholder a normalized path carries in place of the frame token
    #[serde(default = "default_canonical_token")]
    pub canonical_token: String,
}

fn default_version_padding() -> usize {
    3
}

fn default_canonical_token() -> String {
    DEFAULT_CANONICAL_TOKEN.to_string()
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            version_padding: default_version_padding(),
            canonical_token: default_canonical_token(),
        }
    }
}

/// Item that was selected but not updated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedUpdate {
    pub node: String,
    pub reason: String,
}

/// Result of one `apply_updates` call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateReport {
    /// Nothing was selected; the host was not called
    pub no_selection: bool,
    pub applied: Vec<SceneReference>,
    pub skipped: Vec<SkippedUpdate>,
}

pub struct StatusPlanner {
    resolver: VersionResolver,
    settings: UpdateSettings,
    version_pattern: Regex,
}

impl StatusPlanner {
    pub fn new(resolver: VersionResolver, settings: UpdateSettings) -> Self {
        Self {
            resolver,
            settings,
            version_pattern: Regex::new(DEFAULT_VERSION_PATTERN).unwrap(),
        }
    }

    pub fn resolver(&self) -> &VersionResolver {
        &self.resolver
    }

    /// Resolve the latest version and classify the item.
    ///
    /// A template glob that finds nothing is returned as `NotFound`; any other
    /// failure is logged and leaves the item `unknown`.
    pub fn compute_status(&self, item: &mut BreakdownItem) -> Result<ItemStatus> {
        item.update_path = None;
        item.latest_version = LatestVersion::Unresolved;
        item.status = ItemStatus::Unknown;

        let source = match (&item.reference.template, &item.reference.fields, &item.record) {
            (Some(template), Some(fields), _) if !fields.is_empty() => VersionSource::Template { template, fields },
            (_, _, Some(record)) => VersionSource::Record(record),
            _ => {
                debug!(node = item.node_name(), "nothing to resolve from");
                return Ok(ItemStatus::Unknown);
            }
        };

        match self.resolver.resolve_highest_version(source) {
            Ok(latest) => {
                item.latest_version = latest;
                item.status = ItemStatus::classify(item.current_version, latest);
                Ok(item.status)
            }
            Err(e @ BreakdownError::NotFound { .. }) => {
                warn!(node = item.node_name(), error = %e, "no versions on disk");
                Err(e)
            }
            Err(e) => {
                warn!(node = item.node_name(), error = %e, "version lookup failed");
                Ok(ItemStatus::Unknown)
            }
        }
    }

    /// Resolve every item on the worker pool; returns the failures by index
    pub fn compute_all(&self, items: &mut [BreakdownItem]) -> Vec<(usize, BreakdownError)> {
        let failures: Vec<_> = items
            .par_iter_mut()
            .enumerate()
            .filter_map(|(index, item)| self.compute_status(item).err().map(|e| (index, e)))
            .collect();

        let stale = items.iter().filter(|i| i.is_stale()).count();
        info!(items = items.len(), stale, failed = failures.len(), "status computed");
        failures
    }

    /// Path the item should point at after updating to its latest version
    pub fn plan_update_path(&self, item: &BreakdownItem) -> Result<String> {
        let not_applicable = |reason: &str| BreakdownError::NotApplicable {
            node: item.node_name().to_string(),
            reason: reason.to_string(),
        };
        if item.status != ItemStatus::Stale {
            return Err(not_applicable(&format!("status is {}", item.status)));
        }
        let latest = item.latest_version.value().ok_or_else(|| not_applicable("latest version unresolved"))?;
        self.path_for_version(item, latest)
    }

    /// Path of the item's asset at `version`, with the scene's frame token restored
    pub fn path_for_version(&self, item: &BreakdownItem, version: i64) -> Result<String> {
        let reference = &item.reference;
        let path = match (&reference.template, &reference.fields, &item.record) {
            (Some(template), Some(fields), _) if !fields.is_empty() => {
                let keys = self.resolver.keys();
                let mut fields = fields.clone();
                if let Some(eye) = &reference.eye_token {
                    fields.insert(keys.eye.clone(), eye.clone());
                }
                let key = keys.version_key_for(&fields).to_string();
                if key == keys.camera_version {
                    // Camera versions are numbered across steps; take the file that carries it
                    self.resolver.camera_path_for_version(template, &fields, version)?
                } else {
                    fields.insert(key, version);
                    self.resolver.templates().apply_fields(template, &fields)?
                }
            }
            (_, _, Some(record)) => self.published_path(item, record, version)?,
            _ => {
                return Err(BreakdownError::NotApplicable {
                    node: item.node_name().to_string(),
                    reason: "no template or publish record".to_string(),
                })
            }
        };

        Ok(match &reference.sequence_token {
            Some(token) => restore_sequence_token(&path, &self.settings.canonical_token, token),
            None => path,
        })
    }

    /// Stored path of the publish at `version` in the item's stream.
    ///
    /// Candidates must agree with the item's own path once its version token
    /// is bumped; publishes sharing a name but not a path layout are rejected.
    fn published_path(&self, item: &BreakdownItem, record: &VersionRecord, version: i64) -> Result<String> {
        let ambiguous = |reason: String| BreakdownError::AmbiguousTarget {
            node: item.node_name().to_string(),
            reason,
        };
        let entity_type = self.resolver.entity_type();
        let filters = record.identity_filters(entity_type);
        let stream = self.resolver.records().find(entity_type.as_str(), &filters, VERSION_FIELDS)?;

        let expected = self
            .bump_version(&item.reference.normalized_path, version)
            .ok_or_else(|| ambiguous(format!("no version token in {}", item.reference.normalized_path)))?;

        let mut candidates = stream.iter().filter(|r| r.version_number == Some(version)).peekable();
        if candidates.peek().is_none() {
            return Err(ambiguous(format!("no publish at version {}", version)));
        }
        candidates
            .find_map(|r| r.local_path().filter(|p| *p == expected))
            .map(String::from)
            .ok_or_else(|| ambiguous(format!("no publish of version {} stored at {}", version, expected)))
    }

    /// Replace the last version token in `path`
    fn bump_version(&self, path: &str, version: i64) -> Option<String> {
        let token = self.version_pattern.captures_iter(path).last()?.name("version")?;
        let width = match self.settings.version_padding {
            0 => token.as_str().len(),
            padding => padding,
        };
        Some(format!(
            "{}{:0width$}{}",
            &path[..token.start()],
            version,
            &path[token.end()..],
            width = width
        ))
    }

    /// Plan every selected item and hand the successful ones to the host in one call
    pub fn apply_updates<'a>(
        &self,
        selection: impl IntoIterator<Item = &'a mut BreakdownItem>,
        host: &dyn SceneHost,
    ) -> Result<UpdateReport> {
        let mut report = UpdateReport::default();
        let mut planned = Vec::new();
        let mut selected = 0;

        for item in selection {
            selected += 1;
            match self.plan_update_path(item) {
                Ok(path) => {
                    report.applied.push(SceneReference::new(
                        item.reference.node_name.clone(),
                        item.reference.node_type.clone(),
                        path.clone(),
                    ));
                    planned.push((item, path));
                }
                Err(e) => {
                    debug!(node = item.node_name(), error = %e, "update skipped");
                    report.skipped.push(SkippedUpdate {
                        node: item.node_name().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if selected == 0 {
            info!("{}", BreakdownError::NoSelection);
            report.no_selection = true;
            return Ok(report);
        }

        if !report.applied.is_empty() {
            host.update(report.applied.clone())?;
        }
        // Only a scene the host accepted counts as updated
        for (item, path) in planned {
            item.update_path = Some(path);
        }
        info!(applied = report.applied.len(), skipped = report.skipped.len(), "updates applied");
        Ok(report)
    }
}
