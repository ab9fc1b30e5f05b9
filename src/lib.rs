//! Scene Breakdown
//!
//! Finds every file reference in an open scene, works out whether a newer
//! version of each referenced asset exists, and re-points stale references at
//! the latest version.
//!
//! ## Flow
//!
//! ```text
//! SceneHost::scan_scene
//!     └── BreakdownScanner::scan      normalize paths, one bulk publish lookup
//!         └── StatusPlanner::compute_all    latest version per item (disk or records)
//!             └── StatusPlanner::apply_updates   update paths, one SceneHost::update call
//! ```
//!
//! Versions come from one of two places:
//!
//! - **Templates**: the reference decodes against a path template, and sibling
//!   versions are globbed from disk.
//! - **Publish records**: the reference matched a publish, and its stream
//!   (same project, entity, task, type and name) is queried for the highest
//!   `version_number`.

pub mod cache;
pub mod config;
pub mod error;
pub mod fields;
pub mod host;
pub mod item;
pub mod planner;
pub mod record;
pub mod resolver;
pub mod scanner;
pub mod scene;
pub mod sequence;
pub mod template;
pub mod version;

pub use cache::PublishCache;
pub use config::BreakdownConfig;
pub use error::{BreakdownError, Result};
pub use fields::{FieldSet, FieldValue};
pub use host::{InlineHost, SceneHost, SceneOperations, SceneReference, ThreadAffineHost};
pub use item::{select_stale, AssetReference, BreakdownItem, BreakdownReport, ItemSummary, StatusFilter};
pub use planner::{StatusPlanner, UpdateReport, UpdateSettings};
pub use record::{InMemoryRecordStore, PublishEntityType, RecordStore, VersionRecord};
pub use resolver::{VersionResolver, VersionSource};
pub use scanner::BreakdownScanner;
pub use scene::JsonSceneFile;
pub use sequence::{RegexSequenceDetector, SequenceDetector};
pub use template::{FsTemplateResolver, Template, TemplateFieldResolver, TemplateKey};
pub use version::{ItemStatus, LatestVersion, VersionKeys};
