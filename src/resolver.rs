//! Version Resolution
//!
//! Finds the highest available version of an asset, either by globbing the
//! template on disk or by listing the publish stream in the record store.
//!
//! The two sources fail differently. A template match means at least the
//! referenced version should be on disk, so an empty glob is an error. A
//! publish stream may legitimately be empty, which resolves to
//! [`LatestVersion::NotFound`].

use std::sync::Arc;

use tracing::debug;

use crate::error::{BreakdownError, Result};
use crate::fields::FieldSet;
use crate::record::{PublishEntityType, RecordStore, VersionRecord, VERSION_FIELDS};
use crate::template::{Template, TemplateFieldResolver};
use crate::version::{LatestVersion, VersionKeys};

/// What to resolve a latest version from
#[derive(Debug, Clone, Copy)]
pub enum VersionSource<'a> {
    Template { template: &'a Template, fields: &'a FieldSet },
    Record(&'a VersionRecord),
}

/// Computes the highest available version of an asset
#[derive(Clone)]
pub struct VersionResolver {
    templates: Arc<dyn TemplateFieldResolver>,
    records: Arc<dyn RecordStore>,
    keys: VersionKeys,
    entity_type: PublishEntityType,
}

impl VersionResolver {
    pub fn new(
        templates: Arc<dyn TemplateFieldResolver>,
        records: Arc<dyn RecordStore>,
        keys: VersionKeys,
        entity_type: PublishEntityType,
    ) -> Self {
        Self { templates, records, keys, entity_type }
    }

    pub fn keys(&self) -> &VersionKeys {
        &self.keys
    }

    pub fn entity_type(&self) -> PublishEntityType {
        self.entity_type
    }

    pub fn templates(&self) -> &Arc<dyn TemplateFieldResolver> {
        &self.templates
    }

    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    pub fn resolve_highest_version(&self, source: VersionSource<'_>) -> Result<LatestVersion> {
        match source {
            VersionSource::Template { template, fields } => self.highest_on_disk(template, fields),
            VersionSource::Record(record) => self.highest_published(record),
        }
    }

    fn highest_on_disk(&self, template: &Template, fields: &FieldSet) -> Result<LatestVersion> {
        let version_key = self.keys.version_key_for(fields);
        let skip_keys = self.keys.skip_keys_for(fields, template.abstract_keys());

        let paths = self.templates.paths_from_template(template, fields, &skip_keys)?;
        let not_found = || BreakdownError::NotFound {
            template: template.name().to_string(),
            searched: format!("{} with {:?} free", template.definition(), skip_keys),
        };
        if paths.is_empty() {
            return Err(not_found());
        }

        let mut latest = LatestVersion::Unresolved;
        for path in &paths {
            let found = match self.templates.get_fields(template, path) {
                Ok(found) => found,
                Err(e) => {
                    debug!(path = %path, error = %e, "skipping undecodable match");
                    continue;
                }
            };
            match found.get_int(version_key) {
                Some(version) => latest = latest.observe(version),
                None => debug!(path = %path, key = version_key, "match has no version"),
            }
        }

        debug!(template = template.name(), candidates = paths.len(), latest = %latest, "resolved from disk");
        match latest {
            LatestVersion::Value(_) => Ok(latest),
            _ => Err(not_found()),
        }
    }

    fn highest_published(&self, record: &VersionRecord) -> Result<LatestVersion> {
        let filters = record.identity_filters(self.entity_type);
        let stream = self.records.find(self.entity_type.as_str(), &filters, VERSION_FIELDS)?;

        let latest = stream
            .iter()
            .filter_map(|r| r.version_number)
            .fold(LatestVersion::NotFound, LatestVersion::observe);

        debug!(name = ?record.name, publishes = stream.len(), latest = %latest, "resolved from records");
        Ok(latest)
    }

    /// Decoded fields of every camera file of this asset, across steps and versions
    fn camera_matches(&self, template: &Template, fields: &FieldSet) -> Result<Vec<FieldSet>> {
        let varying = [
            &self.keys.version,
            &self.keys.step,
            &self.keys.camera_version,
            &self.keys.eye,
        ];
        let mut search = fields.clone();
        for key in varying {
            search.remove(key);
        }
        let mut skip_keys = template.abstract_keys();
        skip_keys.extend(varying.iter().map(|k| k.to_string()));

        let mut matches = Vec::new();
        for path in self.templates.paths_from_template(template, &search, &skip_keys)? {
            match self.templates.get_fields(template, &path) {
                Ok(found) if found.contains(&self.keys.camera_version) => matches.push(found),
                Ok(_) => debug!(path = %path, "match has no camera version"),
                Err(e) => debug!(path = %path, error = %e, "skipping undecodable match"),
            }
        }
        Ok(matches)
    }

    /// Render a matched file back out, with abstract keys left as placeholders
    fn render_match(&self, template: &Template, mut found: FieldSet) -> Result<String> {
        for key in template.abstract_keys() {
            found.remove(&key);
        }
        self.templates.apply_fields(template, &found)
    }

    fn camera_not_found(&self, template: &Template, what: String) -> BreakdownError {
        BreakdownError::NotFound {
            template: template.name().to_string(),
            searched: format!("{} for {}", template.definition(), what),
        }
    }

    /// Path of the highest camera version on disk, with abstract keys left as placeholders
    pub fn latest_camera_path(&self, template: &Template, fields: &FieldSet) -> Result<String> {
        let camera_key = &self.keys.camera_version;
        let version_key = &self.keys.version;
        let best = self
            .camera_matches(template, fields)?
            .into_iter()
            .max_by_key(|f| (f.get_int(camera_key), f.get_int(version_key)))
            .ok_or_else(|| self.camera_not_found(template, "camera versions".to_string()))?;
        self.render_match(template, best)
    }

    /// Path of an existing file carrying `camera_version`, whichever step and
    /// version it was published under. The highest version wins a tie.
    pub fn camera_path_for_version(&self, template: &Template, fields: &FieldSet, camera_version: i64) -> Result<String> {
        let camera_key = &self.keys.camera_version;
        let version_key = &self.keys.version;
        let best = self
            .camera_matches(template, fields)?
            .into_iter()
            .filter(|f| f.get_int(camera_key) == Some(camera_version))
            .max_by_key(|f| f.get_int(version_key))
            .ok_or_else(|| self.camera_not_found(template, format!("camera version {}", camera_version)))?;
        self.render_match(template, best)
    }
}
