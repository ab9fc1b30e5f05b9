//! Configuration management for the breakdown
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (breakdown.toml)
//! - Environment variables (BREAKDOWN__*)
//!
//! ## Example config file (breakdown.toml):
//! ```toml
//! [keys]
//! version = "version"
//! camera_version = "camera_version"
//! eye = "eye"
//! step = "Step"
//!
//! [normalize]
//! eye_wildcard = "%V"
//! canonical_token = "%04d"
//!
//! [update]
//! version_padding = 3
//!
//! [records]
//! entity_type = "PublishedFile"
//!
//! [paths]
//! root = "/mnt/projects/climp"
//! templates = "config/templates.toml"
//! records = "publishes.json"
//! ```
//!
//! Template definitions live in their own file (see [`TemplateSet`]).

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::cache::PublishCache;
use crate::error::Result;
use crate::planner::{StatusPlanner, UpdateSettings};
use crate::record::{InMemoryRecordStore, PublishEntityType};
use crate::resolver::VersionResolver;
use crate::scanner::{BreakdownScanner, DEFAULT_EYE_WILDCARD};
use crate::sequence::{RegexSequenceDetector, DEFAULT_CANONICAL_TOKEN, DEFAULT_SEQUENCE_PATTERN};
use crate::template::{FsTemplateResolver, TemplateKey};
use crate::version::VersionKeys;

/// Main configuration for the breakdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BreakdownConfig {
    /// Names of the version, camera, eye and step keys
    #[serde(default)]
    pub keys: VersionKeys,

    /// Path normalization settings
    #[serde(default)]
    pub normalize: NormalizeConfig,

    /// Update path settings
    #[serde(default)]
    pub update: UpdateConfig,

    /// Publish record settings
    #[serde(default)]
    pub records: RecordsConfig,

    /// File locations
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizeConfig {
    /// Value forced onto the eye key of stereo templates
    #[serde(default = "default_eye_wildcard")]
    pub eye_wildcard: String,

    /// Frame placeholder publishes are registered with
    #[serde(default = "default_canonical_token")]
    pub canonical_token: String,

    /// Sequence detection regex; the frame token must be the group `seq`
    #[serde(default = "default_sequence_pattern")]
    pub sequence_pattern: String,
}

/// Update configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Zero padding of a bumped version token (0 keeps the existing width)
    #[serde(default = "default_version_padding")]
    pub version_padding: usize,
}

/// Record store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordsConfig {
    /// `PublishedFile`, or `TankPublishedFile` for legacy projects
    #[serde(default)]
    pub entity_type: PublishEntityType,
}

/// Path configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Project root templates are relative to
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// TOML file with `[templates]` and `[template_keys]`
    #[serde(default = "default_templates_file")]
    pub templates: PathBuf,

    /// JSON array of publish records
    #[serde(default = "default_records_file")]
    pub records: PathBuf,

    /// Scene file used when none is given on the command line
    #[serde(default)]
    pub scene: Option<PathBuf>,
}

/// Template definitions and key declarations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateSet {
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    #[serde(default)]
    pub template_keys: BTreeMap<String, TemplateKey>,
}

impl TemplateSet {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

// Default value functions
fn default_eye_wildcard() -> String {
    DEFAULT_EYE_WILDCARD.to_string()
}

fn default_canonical_token() -> String {
    DEFAULT_CANONICAL_TOKEN.to_string()
}

fn default_sequence_pattern() -> String {
    DEFAULT_SEQUENCE_PATTERN.to_string()
}

fn default_version_padding() -> usize {
    3
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_templates_file() -> PathBuf {
    PathBuf::from("templates.toml")
}

fn default_records_file() -> PathBuf {
    PathBuf::from("records.json")
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            eye_wildcard: default_eye_wildcard(),
            canonical_token: default_canonical_token(),
            sequence_pattern: default_sequence_pattern(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            version_padding: default_version_padding(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            templates: default_templates_file(),
            records: default_records_file(),
            scene: None,
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    }
}

impl BreakdownConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = Config::builder();

        let config_locations = ["breakdown.toml", ".breakdown.toml", "config/breakdown.toml"];

        for location in config_locations {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        // XDG config directory
        if let Some(config_dir) = directories::ProjectDirs::from("dev", "familiar", "breakdown") {
            let xdg_config = config_dir.config_dir().join("breakdown.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // BREAKDOWN__UPDATE__VERSION_PADDING=4
        builder = builder.add_source(
            Environment::with_prefix("BREAKDOWN")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Project root (resolves relative paths)
    pub fn root_path(&self) -> PathBuf {
        absolute(&self.paths.root)
    }

    pub fn templates_path(&self) -> PathBuf {
        absolute(&self.paths.templates)
    }

    pub fn records_path(&self) -> PathBuf {
        absolute(&self.paths.records)
    }

    pub fn update_settings(&self) -> UpdateSettings {
        UpdateSettings {
            version_padding: self.update.version_padding,
            canonical_token: self.normalize.canonical_token.clone(),
        }
    }

    /// Template engine over the project root, or one with no templates if the file is absent
    pub fn template_resolver(&self) -> Result<FsTemplateResolver> {
        let path = self.templates_path();
        let set = if path.exists() {
            TemplateSet::load(&path)?
        } else {
            warn!(path = %path.display(), "templates file not found, using sequence detection only");
            TemplateSet::default()
        };
        FsTemplateResolver::from_definitions(self.root_path(), &set.templates, &set.template_keys)
    }

    pub fn record_store(&self) -> Result<InMemoryRecordStore> {
        InMemoryRecordStore::load(self.records_path(), self.records.entity_type)
    }

    pub fn version_resolver(&self) -> Result<VersionResolver> {
        Ok(VersionResolver::new(
            Arc::new(self.template_resolver()?),
            Arc::new(self.record_store()?),
            self.keys.clone(),
            self.records.entity_type,
        ))
    }

    pub fn scanner(&self, resolver: &VersionResolver, cache: Arc<PublishCache>) -> Result<BreakdownScanner> {
        let detector = RegexSequenceDetector::new(&self.normalize.sequence_pattern, self.normalize.canonical_token.clone())?;
        Ok(BreakdownScanner::new(resolver, cache)
            .with_detector(Box::new(detector))
            .with_eye_wildcard(self.normalize.eye_wildcard.clone()))
    }

    pub fn planner(&self, resolver: VersionResolver) -> StatusPlanner {
        StatusPlanner::new(resolver, self.update_settings())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::KeyType;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = BreakdownConfig::default();
        assert_eq!(config.keys.version, "version");
        assert_eq!(config.keys.step, "Step");
        assert_eq!(config.update.version_padding, 3);
        assert_eq!(config.records.entity_type, PublishEntityType::PublishedFile);
        assert_eq!(config.normalize.eye_wildcard, "%V");
    }

    #[test]
    fn test_serialize_config() {
        let config = BreakdownConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[keys]"));
        assert!(toml_str.contains("[update]"));
        assert!(toml_str.contains("[paths]"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("breakdown.toml");
        fs::write(
            &path,
            r#"
[update]
version_padding = 0

[records]
entity_type = "TankPublishedFile"

[paths]
root = "/mnt/projects/climp"
"#,
        )
        .unwrap();

        let config = BreakdownConfig::load_from(Some(path.to_str().unwrap())).unwrap();
        assert_eq!(config.update.version_padding, 0);
        assert_eq!(config.records.entity_type, PublishEntityType::TankPublishedFile);
        assert_eq!(config.root_path(), PathBuf::from("/mnt/projects/climp"));
        assert_eq!(config.normalize.canonical_token, "%04d");
        assert_eq!(config.update_settings().version_padding, 0);
    }

    #[test]
    fn test_template_set_keeps_key_case() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("templates.toml");
        fs::write(
            &path,
            r#"
[templates]
shot_render = "shots/{Shot}/{Step}/{name}_v{version}.{SEQ}.exr"

[template_keys.Shot]
type = "str"

[template_keys.Step]
type = "str"

[template_keys.name]
type = "str"

[template_keys.version]
type = "int"
padding = 3

[template_keys.SEQ]
type = "sequence"
format = "%04d"
"#,
        )
        .unwrap();

        let set = TemplateSet::load(&path).unwrap();
        assert_eq!(set.template_keys["SEQ"].key_type, KeyType::Sequence);
        assert_eq!(set.template_keys["version"].padding, 3);

        let resolver = FsTemplateResolver::from_definitions(dir.path(), &set.templates, &set.template_keys).unwrap();
        assert!(resolver.template("shot_render").is_some());
    }
}
