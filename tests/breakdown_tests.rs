//! End-to-end breakdown tests
//!
//! Builds a project tree in a temp dir, points a config at the fixture
//! templates and publish records, and drives scan, status and update through a
//! scene file on a thread-affine host.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use scene_breakdown::{
    select_stale, BreakdownConfig, BreakdownError, BreakdownReport, ItemStatus, JsonSceneFile, LatestVersion,
    PublishCache, PublishEntityType, SceneReference, StatusFilter, TemplateFieldResolver,
    ThreadAffineHost,
};
use tempfile::{tempdir, TempDir};

fn fixtures_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn touch(root: &Path, relative: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

fn slash(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

struct Project {
    dir: TempDir,
    config: BreakdownConfig,
}

impl Project {
    fn new() -> Self {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("breakdown.toml");
        fs::write(
            &config_path,
            format!(
                "[paths]\nroot = \"{}\"\ntemplates = \"{}\"\nrecords = \"{}\"\n",
                slash(dir.path()),
                slash(&fixtures_path().join("templates.toml")),
                slash(&fixtures_path().join("records.json")),
            ),
        )
        .unwrap();
        let config = BreakdownConfig::load_from(Some(config_path.to_str().unwrap())).unwrap();
        Self { dir, config }
    }

    fn root(&self) -> String {
        slash(self.dir.path())
    }

    fn write_scene(&self, references: &[SceneReference]) -> PathBuf {
        let path = self.dir.path().join("scene.json");
        let document = serde_json::json!({ "references": references });
        fs::write(&path, serde_json::to_string_pretty(&document).unwrap()).unwrap();
        path
    }
}

fn read_scene(path: &Path) -> Vec<SceneReference> {
    let document: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    serde_json::from_value(document["references"].clone()).unwrap()
}

// =============================================================================
// Scan & Status
// =============================================================================

#[test]
fn test_status_across_template_and_record_items() {
    let project = Project::new();
    for version in [1, 2] {
        touch(project.dir.path(), &format!("shots/a010/Comp/beauty_left_v{:03}.1001.exr", version));
    }
    let root = project.root();
    let scene = project.write_scene(&[
        SceneReference::new("Read1", "Read", format!("{}/shots/a010/Comp/beauty_left_v001.1001.exr", root)),
        SceneReference::new("Read2", "Read", "/plates/bg_v002.####.dpx"),
        SceneReference::new("Read3", "Read", "/plates/fg_v001.%04d.dpx"),
        SceneReference::new("Read4", "Read", ""),
        SceneReference::new("Note1", "Text", format!("{}/shots/a010/notes/todo.txt", root)),
    ]);

    let resolver = project.config.version_resolver().unwrap();
    let scanner = project.config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = project.config.planner(resolver);
    let host = ThreadAffineHost::spawn("scene-host", move || JsonSceneFile::new(scene)).unwrap();

    let mut items = scanner.scan_host(&host).unwrap();
    assert_eq!(items.len(), 5);
    assert!(planner.compute_all(&mut items).is_empty());

    let statuses: Vec<_> = items.iter().map(|i| i.status).collect();
    assert_eq!(
        statuses,
        vec![
            ItemStatus::Stale,
            ItemStatus::Stale,
            ItemStatus::Current,
            ItemStatus::Unknown,
            ItemStatus::Unknown,
        ]
    );
    assert_eq!(items[0].latest_version, LatestVersion::Value(2));
    assert_eq!(items[1].latest_version, LatestVersion::Value(3));
    assert_eq!(items[1].thumbnail_url(), Some("https://thumbs.example/101.png"));
    assert_eq!(items[3].latest_version, LatestVersion::Unresolved);

    let report = BreakdownReport::new(&items, StatusFilter::new(false, true));
    assert_eq!(report.stale, 2);
    assert!(report.items.iter().all(|i| i.status != ItemStatus::Current));
}

#[test]
fn test_version_changes_between_scans_are_picked_up() {
    let project = Project::new();
    touch(project.dir.path(), "shots/a010/Comp/beauty_left_v001.1001.exr");
    let raw = format!("{}/shots/a010/Comp/beauty_left_v001.1001.exr", project.root());
    let references = vec![SceneReference::new("Read1", "Read", raw)];

    let resolver = project.config.version_resolver().unwrap();
    let scanner = project.config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = project.config.planner(resolver);

    let mut items = scanner.scan(&references).unwrap();
    assert_eq!(planner.compute_status(&mut items[0]).unwrap(), ItemStatus::Current);

    touch(project.dir.path(), "shots/a010/Comp/beauty_left_v004.1001.exr");
    let mut items = scanner.scan(&references).unwrap();
    assert_eq!(planner.compute_status(&mut items[0]).unwrap(), ItemStatus::Stale);
    assert_eq!(items[0].latest_version, LatestVersion::Value(4));
}

#[test]
fn test_missing_template_versions_report_not_found() {
    let project = Project::new();
    let raw = format!("{}/shots/a010/Comp/beauty_left_v001.1001.exr", project.root());

    let resolver = project.config.version_resolver().unwrap();
    let scanner = project.config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = project.config.planner(resolver);

    let mut items = scanner.scan(&[SceneReference::new("Read1", "Read", raw)]).unwrap();
    let failures = planner.compute_all(&mut items);

    assert_eq!(failures.len(), 1);
    assert!(matches!(failures[0].1, BreakdownError::NotFound { .. }));
    assert_eq!(items[0].status, ItemStatus::Unknown);
}

// =============================================================================
// Update
// =============================================================================

#[test]
fn test_update_all_stale_rewrites_scene_once() {
    let project = Project::new();
    for version in [3, 5] {
        touch(project.dir.path(), &format!("shots/a010/Comp/beauty_left_v{:03}.1001.exr", version));
    }
    let root = project.root();
    let scene = project.write_scene(&[
        SceneReference::new("Read1", "Read", format!("{}/shots/a010/Comp/beauty_left_v003.1001.exr", root)),
        SceneReference::new("Read2", "Read", "/plates/bg_v002.$F4.dpx"),
        SceneReference::new("Read3", "Read", "/plates/fg_v001.####.dpx"),
    ]);

    let resolver = project.config.version_resolver().unwrap();
    let scanner = project.config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = project.config.planner(resolver);
    let scene_file = scene.clone();
    let host = ThreadAffineHost::spawn("scene-host", move || JsonSceneFile::new(scene_file)).unwrap();

    let mut items = scanner.scan_host(&host).unwrap();
    planner.compute_all(&mut items);
    let report = planner.apply_updates(select_stale(&mut items), &host).unwrap();

    assert!(!report.no_selection);
    assert_eq!(report.applied.len(), 2);
    assert!(report.skipped.is_empty());

    let references = read_scene(&scene);
    assert_eq!(
        references[0].path,
        format!("{}/shots/a010/Comp/beauty_left_v005.1001.exr", root)
    );
    assert_eq!(references[1].path, "/plates/bg_v003.$F4.dpx");
    assert_eq!(references[2].path, "/plates/fg_v001.####.dpx");

    // Updated references are current on the next pass
    let mut items = scanner.scan_host(&host).unwrap();
    planner.compute_all(&mut items);
    assert!(select_stale(&mut items).is_empty());
}

#[test]
fn test_update_of_current_item_is_skipped() {
    let project = Project::new();
    let scene = project.write_scene(&[SceneReference::new("Read3", "Read", "/plates/fg_v001.####.dpx")]);

    let resolver = project.config.version_resolver().unwrap();
    let scanner = project.config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = project.config.planner(resolver);
    let scene_file = scene.clone();
    let host = ThreadAffineHost::spawn("scene-host", move || JsonSceneFile::new(scene_file)).unwrap();

    let mut items = scanner.scan_host(&host).unwrap();
    planner.compute_all(&mut items);
    let report = planner.apply_updates(items.iter_mut(), &host).unwrap();

    assert!(report.applied.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].node, "Read3");
    assert!(items[0].update_path.is_none());
}

// =============================================================================
// Camera & legacy records
// =============================================================================

#[test]
fn test_latest_camera_path_searches_all_steps() {
    let project = Project::new();
    touch(project.dir.path(), "shots/a010/Layout/camera/main_v004_cam001.abc");
    touch(project.dir.path(), "shots/a010/Layout/camera/main_v004_cam002.abc");
    touch(project.dir.path(), "shots/a010/Anim/camera/main_v006_cam003.abc");
    let root = project.root();

    let resolver = project.config.version_resolver().unwrap();
    let path = format!("{}/shots/a010/Layout/camera/main_v004_cam001.abc", root);
    let template = resolver.templates().template_from_path(&path).unwrap();
    assert_eq!(template.name(), "shot_camera");

    let fields = resolver.templates().get_fields(&template, &path).unwrap();
    let latest = resolver.latest_camera_path(&template, &fields).unwrap();
    assert_eq!(latest, format!("{}/shots/a010/Anim/camera/main_v006_cam003.abc", root));
}

#[test]
fn test_legacy_entity_type_uses_tank_type() {
    let dir = tempdir().unwrap();
    let records = dir.path().join("legacy.json");
    fs::write(
        &records,
        r#"[
            {"id": 1, "name": "bg", "version_number": 1,
             "project": {"type": "Project", "id": 234},
             "entity": {"type": "Shot", "id": 1660},
             "task": {"type": "Task", "id": 4714},
             "tank_type": {"type": "TankType", "id": 9},
             "path": {"local_path": "/plates/bg_v001.%04d.dpx"}},
            {"id": 2, "name": "bg", "version_number": 2,
             "project": {"type": "Project", "id": 234},
             "entity": {"type": "Shot", "id": 1660},
             "task": {"type": "Task", "id": 4714},
             "tank_type": {"type": "TankType", "id": 9},
             "path": {"local_path": "/plates/bg_v002.%04d.dpx"}}
        ]"#,
    )
    .unwrap();
    let project = Project::new();
    let mut config = project.config.clone();
    config.paths.records = records;
    config.records.entity_type = PublishEntityType::TankPublishedFile;

    let resolver = config.version_resolver().unwrap();
    let scanner = config.scanner(&resolver, Arc::new(PublishCache::new())).unwrap();
    let planner = config.planner(resolver);

    let mut items = scanner
        .scan(&[SceneReference::new("Read1", "Read", "/plates/bg_v001.####.dpx")])
        .unwrap();
    assert_eq!(planner.compute_status(&mut items[0]).unwrap(), ItemStatus::Stale);
    assert_eq!(planner.plan_update_path(&items[0]).unwrap(), "/plates/bg_v002.####.dpx");
}
