//! Scene Breakdown CLI
//!
//! Lists the file references of a scene with their version status and updates
//! stale ones to the latest version.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use scene_breakdown::{
    select_stale, BreakdownConfig, BreakdownItem, BreakdownReport, ItemStatus, JsonSceneFile, PublishCache,
    StatusFilter, StatusPlanner, TemplateFieldResolver, ThreadAffineHost,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scene-breakdown")]
#[command(about = "Check scene references against their latest published versions")]
struct Cli {
    /// Config file (defaults to breakdown.toml lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Scene file (overrides paths.scene)
    #[arg(short, long)]
    scene: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every reference with its current and latest version
    Status {
        /// Only list up-to-date references (with --show-stale, list both)
        #[arg(long)]
        show_current: bool,
        /// Only list out-of-date references
        #[arg(long)]
        show_stale: bool,
        /// Print a JSON report instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Point stale references at their latest version
    Update {
        /// Update every stale reference
        #[arg(long, conflicts_with = "node")]
        all_stale: bool,
        /// Node to update (repeatable)
        #[arg(short, long)]
        node: Vec<String>,
        /// Print the planned paths without touching the scene
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the path of the newest camera version for a camera file
    Camera {
        /// Path of a camera published through a template
        path: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_ref().map(|p| p.to_string_lossy().into_owned());
    let config = BreakdownConfig::load_from(config_path.as_deref()).context("loading configuration")?;
    let resolver = config.version_resolver().context("setting up resolver")?;

    if let Commands::Camera { path } = &cli.command {
        let templates = resolver.templates();
        let template = templates
            .template_from_path(path)
            .ok_or_else(|| anyhow!("{} does not match any template", path))?;
        let fields = templates.get_fields(&template, path)?;
        println!("{}", resolver.latest_camera_path(&template, &fields)?);
        return Ok(());
    }

    let scene_path = cli
        .scene
        .clone()
        .or_else(|| config.paths.scene.clone())
        .ok_or_else(|| anyhow!("no scene given (use --scene or paths.scene)"))?;
    let host = ThreadAffineHost::spawn("scene-host", move || JsonSceneFile::new(scene_path))?;

    let scanner = config.scanner(&resolver, Arc::new(PublishCache::new()))?;
    let planner = config.planner(resolver);

    let mut items = scanner.scan_host(&host)?;
    for (index, error) in planner.compute_all(&mut items) {
        eprintln!("   ⚠️  {}: {}", items[index].node_name(), error);
    }

    match cli.command {
        Commands::Status { show_current, show_stale, json } => {
            let filter = StatusFilter::new(show_current, show_stale);
            if json {
                let report = BreakdownReport::new(&items, filter);
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_status(&items, filter);
            }
            Ok(())
        }

        Commands::Update { all_stale, node, dry_run } => {
            if !all_stale && node.is_empty() {
                bail!("nothing to update: pass --all-stale or --node");
            }
            if dry_run {
                return print_plan(&planner, &items, all_stale, &node);
            }

            let report = if all_stale {
                planner.apply_updates(select_stale(&mut items), &host)?
            } else {
                let selection = items.iter_mut().filter(|i| node.iter().any(|n| n == i.node_name()));
                planner.apply_updates(selection, &host)?
            };

            if report.no_selection {
                println!("Nothing selected.");
            }
            for reference in &report.applied {
                println!("  ✅ {} -> {}", reference.node, reference.path);
            }
            for skipped in &report.skipped {
                println!("  ⏭️  {} ({})", skipped.node, skipped.reason);
            }
            Ok(())
        }

        Commands::Camera { .. } => Ok(()),
    }
}

fn status_marker(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Current => "🟢",
        ItemStatus::Stale => "🔴",
        ItemStatus::Unknown => "⚪",
    }
}

fn print_status(items: &[BreakdownItem], filter: StatusFilter) {
    println!("🔍 Scene breakdown ({} references)", items.len());
    println!();
    for item in items.iter().filter(|i| filter.accepts(i.status)) {
        let current = item.current_version.map_or_else(|| "-".to_string(), |v| v.to_string());
        println!(
            "  {} {:<24} v{:<6} latest {:<10} {}",
            status_marker(item.status),
            item.node_name(),
            current,
            item.latest_version.to_string(),
            item.reference.raw_path
        );
    }

    let stale = items.iter().filter(|i| i.is_stale()).count();
    println!();
    if stale > 0 {
        println!("❌ {} reference(s) out of date", stale);
    } else {
        println!("✅ No stale references");
    }
}

fn print_plan(planner: &StatusPlanner, items: &[BreakdownItem], all_stale: bool, nodes: &[String]) -> anyhow::Result<()> {
    let selected = items
        .iter()
        .filter(|i| if all_stale { i.is_stale() } else { nodes.iter().any(|n| n == i.node_name()) });
    for item in selected {
        match planner.plan_update_path(item) {
            Ok(path) => println!("  {} -> {}", item.node_name(), path),
            Err(e) => println!("  ⏭️  {} ({})", item.node_name(), e),
        }
    }
    Ok(())
}
