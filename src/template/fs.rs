//! Filesystem-backed template engine
//!
//! Templates are defined relative to a project root. Globbing walks only the
//! directory that the given fields pin down, then filters with the template's
//! search pattern.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};
use walkdir::WalkDir;

use super::{Template, TemplateFieldResolver, TemplateKey};
use crate::error::{BreakdownError, Result};
use crate::fields::FieldSet;

/// Render a path with forward slashes regardless of platform
fn to_slash_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Template resolver over a project directory
#[derive(Debug, Clone)]
pub struct FsTemplateResolver {
    root: PathBuf,
    /// Root as a slash-separated prefix, without trailing slash
    root_prefix: String,
    templates: Vec<Arc<Template>>,
}

impl FsTemplateResolver {
    pub fn new(root: impl Into<PathBuf>, templates: Vec<Template>) -> Self {
        let root = root.into();
        let root_prefix = root.to_string_lossy().replace('\\', "/").trim_end_matches('/').to_string();
        Self {
            root,
            root_prefix,
            templates: templates.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build from `name -> definition` pairs and key declarations
    pub fn from_definitions(
        root: impl Into<PathBuf>,
        definitions: &BTreeMap<String, String>,
        keys: &BTreeMap<String, TemplateKey>,
    ) -> Result<Self> {
        let templates = definitions
            .iter()
            .map(|(name, definition)| Template::new(name.clone(), definition.clone(), keys))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(root, templates))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn templates(&self) -> &[Arc<Template>] {
        &self.templates
    }

    pub fn template(&self, name: &str) -> Option<Arc<Template>> {
        self.templates.iter().find(|t| t.name() == name).cloned()
    }

    /// Strip the project root from an absolute path
    fn relative<'a>(&self, path: &'a str) -> Option<&'a str> {
        if self.root_prefix.is_empty() {
            return Some(path);
        }
        path.strip_prefix(&self.root_prefix)?.strip_prefix('/')
    }

    fn absolute(&self, relative: &str) -> String {
        if self.root_prefix.is_empty() {
            relative.to_string()
        } else {
            format!("{}/{}", self.root_prefix, relative)
        }
    }
}

impl TemplateFieldResolver for FsTemplateResolver {
    fn template_from_path(&self, path: &str) -> Option<Arc<Template>> {
        let relative = self.relative(path)?;
        self.templates
            .iter()
            .find(|t| t.get_fields(relative).is_ok())
            .cloned()
    }

    fn get_fields(&self, template: &Template, path: &str) -> Result<FieldSet> {
        let relative = self.relative(path).ok_or_else(|| BreakdownError::PathMismatch {
            template: template.name().to_string(),
            path: path.to_string(),
        })?;
        template.get_fields(relative)
    }

    fn apply_fields(&self, template: &Template, fields: &FieldSet) -> Result<String> {
        Ok(self.absolute(&template.apply_fields(fields)?))
    }

    fn paths_from_template(
        &self,
        template: &Template,
        fields: &FieldSet,
        skip_keys: &BTreeSet<String>,
    ) -> Result<Vec<String>> {
        let pattern = template.search_pattern(fields, skip_keys)?;
        let prefix = template.fixed_prefix(fields, skip_keys)?;
        let search_dir = self.root.join(&prefix);

        if !search_dir.is_dir() {
            debug!(template = template.name(), dir = %search_dir.display(), "search directory missing");
            return Ok(Vec::new());
        }

        let mut matches = Vec::new();
        for entry in WalkDir::new(&search_dir).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(template = template.name(), dir = %search_dir.display(), error = %e, "template glob failed");
                    return Err(BreakdownError::LookupFailure(format!(
                        "walking {} for {}: {}",
                        search_dir.display(),
                        template.name(),
                        e
                    )));
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else { continue };
            let relative = to_slash_string(relative);
            if pattern.is_match(&relative) {
                matches.push(self.absolute(&relative));
            }
        }
        matches.sort();

        debug!(template = template.name(), found = matches.len(), "template glob");
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::tests::render_keys;
    use std::fs;
    use tempfile::tempdir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"").unwrap();
    }

    fn resolver(root: &Path) -> FsTemplateResolver {
        let mut definitions = BTreeMap::new();
        definitions.insert(
            "shot_render".to_string(),
            "shots/{Shot}/{Step}/{name}_v{version}.{SEQ}.exr".to_string(),
        );
        FsTemplateResolver::from_definitions(root, &definitions, &render_keys()).unwrap()
    }

    #[test]
    fn test_template_from_path() {
        let dir = tempdir().unwrap();
        let resolver = resolver(dir.path());
        let root = resolver.root_prefix.clone();

        let found = resolver.template_from_path(&format!("{}/shots/a010/Comp/beauty_v001.0001.exr", root));
        assert_eq!(found.map(|t| t.name().to_string()), Some("shot_render".to_string()));
        assert!(resolver.template_from_path("/elsewhere/shots/a010/Comp/beauty_v001.0001.exr").is_none());
    }

    #[test]
    fn test_paths_from_template_skips_keys() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "shots/a010/Comp/beauty_v001.0001.exr");
        touch(dir.path(), "shots/a010/Comp/beauty_v001.0002.exr");
        touch(dir.path(), "shots/a010/Comp/beauty_v002.0001.exr");
        touch(dir.path(), "shots/a010/Comp/matte_v009.0001.exr");
        touch(dir.path(), "shots/a020/Comp/beauty_v005.0001.exr");

        let resolver = resolver(dir.path());
        let template = resolver.template("shot_render").unwrap();
        let fields = FieldSet::new()
            .with("Shot", "a010")
            .with("Step", "Comp")
            .with("name", "beauty")
            .with("version", 1);
        let skip: BTreeSet<String> = ["version", "SEQ"].iter().map(|s| s.to_string()).collect();

        let paths = resolver.paths_from_template(&template, &fields, &skip).unwrap();
        assert_eq!(paths.len(), 3);
        assert!(paths.iter().all(|p| p.contains("/shots/a010/Comp/beauty_v00")));
    }

    #[test]
    fn test_apply_fields_is_rooted() {
        let dir = tempdir().unwrap();
        let resolver = resolver(dir.path());
        let template = resolver.template("shot_render").unwrap();
        let fields = FieldSet::new()
            .with("Shot", "a010")
            .with("Step", "Comp")
            .with("name", "beauty")
            .with("version", 4);

        let path = resolver.apply_fields(&template, &fields).unwrap();
        assert_eq!(path, format!("{}/shots/a010/Comp/beauty_v004.%04d.exr", resolver.root_prefix));
        assert_eq!(resolver.get_fields(&template, &path).unwrap().get_int("version"), Some(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_unwalkable_directory_is_a_lookup_failure() {
        let dir = tempdir().unwrap();
        touch(dir.path(), "shots/a010/Comp/beauty_v001.0001.exr");
        std::os::unix::fs::symlink(dir.path().join("shots/a010/Comp"), dir.path().join("shots/a010/Comp/loop")).unwrap();

        let resolver = resolver(dir.path());
        let template = resolver.template("shot_render").unwrap();
        let fields = FieldSet::new()
            .with("Shot", "a010")
            .with("Step", "Comp")
            .with("name", "beauty");
        let skip: BTreeSet<String> = ["version", "SEQ"].iter().map(|s| s.to_string()).collect();

        let result = resolver.paths_from_template(&template, &fields, &skip);
        assert!(matches!(result, Err(BreakdownError::LookupFailure(_))));
    }
}
