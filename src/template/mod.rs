//! Path Templates
//!
//! A template such as `{Shot}/{Step}/{name}_v{version}.{SEQ}.exr` decomposes a
//! path into named fields and renders a path back out of a [`FieldSet`].
//!
//! The breakdown core only talks to templates through [`TemplateFieldResolver`];
//! [`FsTemplateResolver`] is the filesystem-backed engine used by the CLI and tests.
//!
//! ## Key declarations
//! ```toml
//! [template_keys.version]
//! type = "int"
//! padding = 3
//!
//! [template_keys.SEQ]
//! type = "sequence"
//! format = "%04d"
//!
//! [template_keys.eye]
//! type = "str"
//! default = "%V"
//! ```

pub mod fs;

pub use fs::FsTemplateResolver;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{BreakdownError, Result};
use crate::fields::{FieldSet, FieldValue};

/// Value kind of a template key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    Str,
    Int,
    /// Frame number; always abstract
    Sequence,
}

/// Declaration of one template key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateKey {
    #[serde(rename = "type", default)]
    pub key_type: KeyType,

    /// Zero padding for integer keys
    #[serde(default)]
    pub padding: usize,

    /// Placeholder rendered for a sequence key with no value (e.g. `%04d`)
    #[serde(default)]
    pub format: Option<String>,

    #[serde(default)]
    pub is_abstract: bool,

    #[serde(default)]
    pub default: Option<String>,
}

impl TemplateKey {
    pub fn str() -> Self {
        Self::default()
    }

    pub fn int(padding: usize) -> Self {
        Self { key_type: KeyType::Int, padding, ..Self::default() }
    }

    pub fn sequence(format: impl Into<String>) -> Self {
        Self {
            key_type: KeyType::Sequence,
            format: Some(format.into()),
            is_abstract: true,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract || self.key_type == KeyType::Sequence
    }

    fn value_pattern(&self) -> &'static str {
        match self.key_type {
            KeyType::Str => r"[^/]+?",
            KeyType::Int => r"\d+",
            KeyType::Sequence => r"(?:\d+|%0?\d*d|#+|@+|<[^/<>]+>|\$F\d*)",
        }
    }

    /// Default value rendered when a field is absent
    fn fallback(&self) -> Option<String> {
        self.default.clone().or_else(|| match self.key_type {
            KeyType::Sequence => Some(self.format.clone().unwrap_or_else(|| "%04d".to_string())),
            _ => None,
        })
    }
}

#[derive(Debug, Clone)]
enum Token {
    Literal(String),
    Key(String),
}

/// A parsed path template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    definition: String,
    tokens: Vec<Token>,
    keys: BTreeMap<String, TemplateKey>,
    pattern: Regex,
    /// Capture group `g{i}` belongs to `group_keys[i]`
    group_keys: Vec<String>,
}

impl Template {
    /// Parse a definition against the declared keys
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        declared: &BTreeMap<String, TemplateKey>,
    ) -> Result<Self> {
        let name = name.into();
        let definition = definition.into();
        let tokens = tokenize(&name, &definition)?;

        let mut keys = BTreeMap::new();
        for token in &tokens {
            if let Token::Key(key) = token {
                let decl = declared.get(key).ok_or_else(|| BreakdownError::InvalidTemplate {
                    name: name.clone(),
                    reason: format!("undeclared key {{{}}}", key),
                })?;
                keys.insert(key.clone(), decl.clone());
            }
        }

        let mut source = String::from("^");
        let mut group_keys = Vec::new();
        for token in &tokens {
            match token {
                Token::Literal(text) => source.push_str(&regex::escape(text)),
                Token::Key(key) => {
                    source.push_str(&format!("(?P<g{}>{})", group_keys.len(), keys[key].value_pattern()));
                    group_keys.push(key.clone());
                }
            }
        }
        source.push('$');

        Ok(Self {
            name,
            definition,
            tokens,
            keys,
            pattern: Regex::new(&source)?,
            group_keys,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn keys(&self) -> &BTreeMap<String, TemplateKey> {
        &self.keys
    }

    pub fn abstract_keys(&self) -> BTreeSet<String> {
        self.keys
            .iter()
            .filter(|(_, key)| key.is_abstract())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Decode a template-relative path into fields
    pub fn get_fields(&self, path: &str) -> Result<FieldSet> {
        let mismatch = || BreakdownError::PathMismatch {
            template: self.name.clone(),
            path: path.to_string(),
        };
        let caps = self.pattern.captures(path).ok_or_else(mismatch)?;

        let mut fields = FieldSet::new();
        for (i, key) in self.group_keys.iter().enumerate() {
            let Some(raw) = caps.name(&format!("g{}", i)) else { continue };
            let value = match self.keys[key].key_type {
                KeyType::Int => FieldValue::Int(raw.as_str().parse().map_err(|_| {
                    BreakdownError::InvalidField {
                        key: key.clone(),
                        reason: format!("{:?} is not an integer", raw.as_str()),
                    }
                })?),
                KeyType::Str | KeyType::Sequence => FieldValue::Str(raw.as_str().to_string()),
            };
            // A key repeated in the definition must decode to one value
            if let Some(previous) = fields.get(key) {
                if previous != &value {
                    return Err(mismatch());
                }
            }
            fields.insert(key.clone(), value);
        }
        Ok(fields)
    }

    /// Render a template-relative path from fields, falling back to key defaults
    pub fn apply_fields(&self, fields: &FieldSet) -> Result<String> {
        let mut out = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => out.push_str(text),
                Token::Key(key) => match fields.get(key) {
                    Some(value) => out.push_str(&self.format_value(key, value)?),
                    None => {
                        let fallback = self.keys[key].fallback().ok_or_else(|| BreakdownError::MissingField {
                            template: self.name.clone(),
                            key: key.clone(),
                        })?;
                        out.push_str(&fallback);
                    }
                },
            }
        }
        Ok(out)
    }

    /// Regex matching every relative path that agrees with `fields` on all
    /// keys outside `skip_keys`. Absent keys are free as well.
    pub fn search_pattern(&self, fields: &FieldSet, skip_keys: &BTreeSet<String>) -> Result<Regex> {
        let mut source = String::from("^");
        for token in &self.tokens {
            match token {
                Token::Literal(text) => source.push_str(&regex::escape(text)),
                Token::Key(key) => match fields.get(key) {
                    Some(value) if !skip_keys.contains(key) => {
                        source.push_str(&regex::escape(&self.format_value(key, value)?))
                    }
                    _ => source.push_str(&format!("(?:{})", self.keys[key].value_pattern())),
                },
            }
        }
        source.push('$');
        Ok(Regex::new(&source)?)
    }

    /// Directory portion of the template that is fixed by `fields`
    pub fn fixed_prefix(&self, fields: &FieldSet, skip_keys: &BTreeSet<String>) -> Result<String> {
        let mut prefix = String::new();
        for token in &self.tokens {
            match token {
                Token::Literal(text) => prefix.push_str(text),
                Token::Key(key) => match fields.get(key) {
                    Some(value) if !skip_keys.contains(key) => prefix.push_str(&self.format_value(key, value)?),
                    _ => break,
                },
            }
        }
        Ok(match prefix.rfind('/') {
            Some(idx) => prefix[..idx].to_string(),
            None => String::new(),
        })
    }

    fn format_value(&self, key: &str, value: &FieldValue) -> Result<String> {
        let decl = &self.keys[key];
        match (decl.key_type, value) {
            (KeyType::Int, FieldValue::Int(v)) => Ok(format!("{:0width$}", v, width = decl.padding)),
            (KeyType::Int, FieldValue::Str(s)) => Err(BreakdownError::InvalidField {
                key: key.to_string(),
                reason: format!("expected integer, got {:?}", s),
            }),
            (_, value) => Ok(value.to_string()),
        }
    }
}

fn tokenize(name: &str, definition: &str) -> Result<Vec<Token>> {
    let invalid = |reason: &str| BreakdownError::InvalidTemplate {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let mut tokens = Vec::new();
    let mut rest = definition;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            tokens.push(Token::Literal(rest[..open].to_string()));
        }
        let close = rest[open..].find('}').ok_or_else(|| invalid("unclosed '{'"))? + open;
        let key = &rest[open + 1..close];
        if key.is_empty() || key.contains('{') {
            return Err(invalid("malformed key"));
        }
        tokens.push(Token::Key(key.to_string()));
        rest = &rest[close + 1..];
    }
    if rest.contains('}') {
        return Err(invalid("unmatched '}'"));
    }
    if !rest.is_empty() {
        tokens.push(Token::Literal(rest.to_string()));
    }
    Ok(tokens)
}

/// The path-template engine contract consumed by the breakdown core
pub trait TemplateFieldResolver: Send + Sync {
    /// First template whose pattern matches the path
    fn template_from_path(&self, path: &str) -> Option<Arc<Template>>;

    fn get_fields(&self, template: &Template, path: &str) -> Result<FieldSet>;

    fn apply_fields(&self, template: &Template, fields: &FieldSet) -> Result<String>;

    /// Every existing path matching `fields`, with `skip_keys` free to vary
    fn paths_from_template(
        &self,
        template: &Template,
        fields: &FieldSet,
        skip_keys: &BTreeSet<String>,
    ) -> Result<Vec<String>>;
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn render_keys() -> BTreeMap<String, TemplateKey> {
        let mut keys = BTreeMap::new();
        keys.insert("Shot".to_string(), TemplateKey::str());
        keys.insert("Step".to_string(), TemplateKey::str());
        keys.insert("name".to_string(), TemplateKey::str());
        keys.insert("eye".to_string(), TemplateKey::str().with_default("%V"));
        keys.insert("version".to_string(), TemplateKey::int(3));
        keys.insert("camera_version".to_string(), TemplateKey::int(3));
        keys.insert("SEQ".to_string(), TemplateKey::sequence("%04d"));
        keys
    }

    fn render_template() -> Template {
        Template::new(
            "shot_render",
            "shots/{Shot}/{Step}/{name}_{eye}_v{version}.{SEQ}.exr",
            &render_keys(),
        )
        .unwrap()
    }

    #[test]
    fn test_get_fields() {
        let template = render_template();
        let fields = template.get_fields("shots/aaa_00010/Comp/beauty_left_v012.0101.exr").unwrap();

        assert_eq!(fields.get_int("version"), Some(12));
        assert_eq!(fields.get("Shot"), Some(&FieldValue::from("aaa_00010")));
        assert_eq!(fields.get("eye"), Some(&FieldValue::from("left")));
        assert_eq!(fields.get("SEQ"), Some(&FieldValue::from("0101")));
    }

    #[test]
    fn test_get_fields_rejects_foreign_path() {
        let template = render_template();
        let err = template.get_fields("assets/chair/model.ma").unwrap_err();
        assert!(matches!(err, BreakdownError::PathMismatch { .. }));
    }

    #[test]
    fn test_apply_fields_uses_defaults_for_missing_keys() {
        let template = render_template();
        let fields = FieldSet::new()
            .with("Shot", "aaa_00010")
            .with("Step", "Comp")
            .with("name", "beauty")
            .with("version", 7);

        let path = template.apply_fields(&fields).unwrap();
        assert_eq!(path, "shots/aaa_00010/Comp/beauty_%V_v007.%04d.exr");
    }

    #[test]
    fn test_apply_fields_missing_required_key() {
        let template = render_template();
        let err = template.apply_fields(&FieldSet::new().with("version", 1)).unwrap_err();
        assert!(matches!(err, BreakdownError::MissingField { .. }));
    }

    #[test]
    fn test_abstract_keys() {
        let template = render_template();
        let abstract_keys = template.abstract_keys();
        assert!(abstract_keys.contains("SEQ"));
        assert!(!abstract_keys.contains("eye"));
    }

    #[test]
    fn test_undeclared_key_is_rejected() {
        let err = Template::new("bad", "{Unknown}/file.ma", &render_keys()).unwrap_err();
        assert!(matches!(err, BreakdownError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_repeated_key_must_agree() {
        let template = Template::new("twice", "{Shot}/{Shot}_v{version}.ma", &render_keys()).unwrap();
        assert!(template.get_fields("a010/a010_v001.ma").is_ok());
        assert!(template.get_fields("a010/b020_v001.ma").is_err());
    }

    #[test]
    fn test_search_pattern_and_prefix() {
        let template = render_template();
        let fields = FieldSet::new()
            .with("Shot", "aaa_00010")
            .with("Step", "Comp")
            .with("name", "beauty")
            .with("version", 1);
        let skip: BTreeSet<String> = ["version", "eye", "SEQ"].iter().map(|s| s.to_string()).collect();

        let pattern = template.search_pattern(&fields, &skip).unwrap();
        assert!(pattern.is_match("shots/aaa_00010/Comp/beauty_right_v004.0001.exr"));
        assert!(!pattern.is_match("shots/aaa_00020/Comp/beauty_right_v004.0001.exr"));

        assert_eq!(template.fixed_prefix(&fields, &skip).unwrap(), "shots/aaa_00010/Comp");
    }
}
