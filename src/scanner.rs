//! Breakdown Scanner
//!
//! Turns raw scene references into [`BreakdownItem`]s:
//!
//! 1. normalize every path (template decode, or sequence detection as fallback)
//! 2. serve already-known publishes from the [`PublishCache`]
//! 3. fetch the rest from the record store in one bulk query
//! 4. cache what came back and join it onto the items by normalized path
//!
//! Latest-version resolution is left to the planner so it can run per item.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::PublishCache;
use crate::error::Result;
use crate::fields::FieldSet;
use crate::host::{SceneHost, SceneReference};
use crate::item::{AssetReference, BreakdownItem};
use crate::record::{PublishEntityType, RecordStore, VersionRecord};
use crate::resolver::VersionResolver;
use crate::sequence::{RegexSequenceDetector, SequenceDetector};
use crate::template::{KeyType, Template, TemplateFieldResolver};
use crate::version::VersionKeys;

/// Default value forced onto the eye key
pub const DEFAULT_EYE_WILDCARD: &str = "%V";

pub struct BreakdownScanner {
    templates: Arc<dyn TemplateFieldResolver>,
    records: Arc<dyn RecordStore>,
    cache: Arc<PublishCache>,
    detector: Box<dyn SequenceDetector>,
    keys: VersionKeys,
    entity_type: PublishEntityType,
    eye_wildcard: String,
}

impl BreakdownScanner {
    /// Share the resolver's template engine, record store and key names
    pub fn new(resolver: &VersionResolver, cache: Arc<PublishCache>) -> Self {
        Self {
            templates: Arc::clone(resolver.templates()),
            records: Arc::clone(resolver.records()),
            cache,
            detector: Box::new(RegexSequenceDetector::default()),
            keys: resolver.keys().clone(),
            entity_type: resolver.entity_type(),
            eye_wildcard: DEFAULT_EYE_WILDCARD.to_string(),
        }
    }

    pub fn with_detector(mut self, detector: Box<dyn SequenceDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_eye_wildcard(mut self, wildcard: impl Into<String>) -> Self {
        self.eye_wildcard = wildcard.into();
        self
    }

    pub fn cache(&self) -> &Arc<PublishCache> {
        &self.cache
    }

    /// Ask the host for its references, then scan them
    pub fn scan_host(&self, host: &dyn SceneHost) -> Result<Vec<BreakdownItem>> {
        let references = host.scan_scene()?;
        self.scan(&references)
    }

    /// One item per input reference, in input order
    pub fn scan(&self, references: &[SceneReference]) -> Result<Vec<BreakdownItem>> {
        let assets: Vec<AssetReference> = references.iter().map(|r| self.normalize(r)).collect();

        let mut resolved: HashMap<String, VersionRecord> = HashMap::new();
        let mut to_fetch = Vec::new();
        let mut seen = HashSet::new();
        for asset in &assets {
            let path = &asset.normalized_path;
            if path.is_empty() || !seen.insert(path.clone()) {
                continue;
            }
            match self.cache.get(path) {
                Some(record) => {
                    resolved.insert(path.clone(), record);
                }
                None => to_fetch.push(path.clone()),
            }
        }
        let cache_hits = resolved.len();

        let mut fetched = 0;
        if !to_fetch.is_empty() {
            let found = self.records.find_publishes(&to_fetch, &self.entity_type.lookup_fields())?;
            fetched = found.len();
            for (path, record) in found {
                self.cache.insert(path.clone(), record.clone());
                resolved.insert(path, record);
            }
        }

        info!(
            references = references.len(),
            unique_paths = seen.len(),
            cache_hits,
            queried = to_fetch.len(),
            fetched,
            "scene scanned"
        );

        Ok(assets
            .into_iter()
            .map(|asset| {
                let record = resolved.get(&asset.normalized_path).cloned();
                BreakdownItem::new(asset, record, &self.keys)
            })
            .collect())
    }

    /// Canonical form of one reference
    pub fn normalize(&self, reference: &SceneReference) -> AssetReference {
        let mut asset = AssetReference {
            node_name: reference.node.clone(),
            node_type: reference.node_type.clone(),
            raw_path: reference.path.clone(),
            normalized_path: reference.path.clone(),
            template: None,
            fields: None,
            sequence_token: None,
            eye_token: None,
        };
        if reference.path.is_empty() {
            return asset;
        }

        if let Some(template) = self.templates.template_from_path(&reference.path) {
            match self.normalize_with_template(&template, &reference.path) {
                Ok(Some(form)) => {
                    asset.normalized_path = form.normalized;
                    asset.fields = Some(form.fields);
                    asset.sequence_token = form.sequence_token;
                    asset.eye_token = form.eye_token;
                    asset.template = Some(template);
                    return asset;
                }
                Ok(None) => debug!(path = %reference.path, template = template.name(), "template has no version"),
                Err(e) => warn!(path = %reference.path, template = template.name(), error = %e, "template decode failed"),
            }
        }

        if let Some(found) = self.detector.detect_and_normalize(&reference.path) {
            asset.normalized_path = found.normalized;
            asset.sequence_token = Some(found.token);
        }
        asset
    }

    /// Strip abstract keys and wildcard the eye so the path renders in publish form
    fn normalize_with_template(
        &self,
        template: &Template,
        path: &str,
    ) -> Result<Option<PublishForm>> {
        let mut fields = self.templates.get_fields(template, path)?;
        if fields.get_int(self.keys.version_key_for(&fields)).is_none() {
            return Ok(None);
        }

        let mut token = None;
        for (name, key) in template.keys() {
            if !key.is_abstract() {
                continue;
            }
            if let Some(value) = fields.remove(name) {
                if key.key_type == KeyType::Sequence && token.is_none() {
                    token = Some(value.to_string());
                }
            }
        }
        let mut eye_token = None;
        if template.keys().contains_key(&self.keys.eye) {
            eye_token = fields
                .insert(self.keys.eye.clone(), self.eye_wildcard.clone())
                .map(|value| value.to_string())
                .filter(|value| *value != self.eye_wildcard);
        }

        let normalized = self.templates.apply_fields(template, &fields)?;
        Ok(Some(PublishForm {
            normalized,
            fields,
            sequence_token: token,
            eye_token,
        }))
    }
}

/// A template path rewritten to the form publishes are registered under
struct PublishForm {
    normalized: String,
    fields: FieldSet,
    sequence_token: Option<String>,
    eye_token: Option<String>,
}
