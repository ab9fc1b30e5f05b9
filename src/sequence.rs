//! Frame sequence detection for references no template recognises
//!
//! Host applications spell frame placeholders differently (`####`, `%04d`,
//! `$F4`, `<UDIM>`, or a literal frame number). Publishes are stored with one
//! canonical placeholder, so the scanner rewrites the token before lookup and
//! restores the original spelling when a path goes back into the scene.

use regex::Regex;

use crate::error::Result;

/// Frame token between the last two dots of the file name
pub const DEFAULT_SEQUENCE_PATTERN: &str = r"^.+\.(?P<seq><[^<>]+>|\d+|#+|@+|%0?\d*d|\$F\d*)\.[^.]+$";

/// Canonical placeholder publishes are registered with
pub const DEFAULT_CANONICAL_TOKEN: &str = "%04d";

/// A path rewritten to the canonical sequence form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceMatch {
    pub normalized: String,
    /// The literal token that was replaced
    pub token: String,
}

/// Strategy for finding and canonicalising a frame token
pub trait SequenceDetector: Send + Sync {
    fn detect_and_normalize(&self, path: &str) -> Option<SequenceMatch>;
}

/// Regex-driven detector applied to the file name component
#[derive(Debug, Clone)]
pub struct RegexSequenceDetector {
    pattern: Regex,
    canonical: String,
}

impl Default for RegexSequenceDetector {
    fn default() -> Self {
        Self {
            pattern: Regex::new(DEFAULT_SEQUENCE_PATTERN).unwrap(),
            canonical: DEFAULT_CANONICAL_TOKEN.to_string(),
        }
    }
}

impl RegexSequenceDetector {
    /// `pattern` must expose the frame token as the named group `seq`
    pub fn new(pattern: &str, canonical: impl Into<String>) -> Result<Self> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
            canonical: canonical.into(),
        })
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

impl SequenceDetector for RegexSequenceDetector {
    fn detect_and_normalize(&self, path: &str) -> Option<SequenceMatch> {
        let name_start = path.rfind(|c: char| c == '/' || c == '\\').map_or(0, |i| i + 1);
        let caps = self.pattern.captures(&path[name_start..])?;
        let seq = caps.name("seq")?;

        let start = name_start + seq.start();
        let end = name_start + seq.end();
        Some(SequenceMatch {
            normalized: format!("{}{}{}", &path[..start], self.canonical, &path[end..]),
            token: seq.as_str().to_string(),
        })
    }
}

/// Put a remembered frame token back in place of the canonical placeholder,
/// or of any printf-style placeholder when the canonical one is absent
pub fn restore_sequence_token(path: &str, canonical: &str, token: &str) -> String {
    static PLACEHOLDER: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    if !canonical.is_empty() && path.contains(canonical) {
        return path.replace(canonical, token);
    }
    let placeholder = PLACEHOLDER.get_or_init(|| Regex::new(r"%+\d+d").unwrap());
    placeholder.replace_all(path, regex::NoExpand(token)).into_owned()
}
