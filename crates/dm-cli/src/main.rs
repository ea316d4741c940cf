//! DM Mod Merge CLI
//!
//! Command-line tool for scanning, inspecting, and merging `.dm` mod scripts.

use clap::{Parser, Subcommand};
use dm_core::{
    allocate, load_sources, merge, parse_mod, scan_mods, ConflictKind, EntityType, MergeOptions,
};
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dm-cli")]
#[command(about = "DM Mod Merger", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan directories for .dm mod scripts
    Scan {
        /// Root directories to scan
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
    },

    /// Parse a single mod and show what it defines
    Parse {
        /// Path to a .dm file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Dry-run a merge: report conflicts and remaps without writing
    Check {
        /// Root directories to scan for mods
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,
    },

    /// Merge all discovered mods into one script
    Merge {
        /// Root directories to scan for mods
        #[arg(short, long, required = true)]
        root: Vec<PathBuf>,

        /// Output path for the merged script
        #[arg(short, long)]
        output: PathBuf,

        /// Name of the merged mod
        #[arg(short, long)]
        name: Option<String>,

        /// Icon path to reference from the merged header
        #[arg(long)]
        icon: Option<String>,

        /// Version string for the merged header
        #[arg(long)]
        version: Option<String>,

        /// Write the merge report as JSON to this path
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> dm_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Scan { root } => cmd_scan(&root),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Check { root } => cmd_check(&root),
        Commands::Merge {
            root,
            output,
            name,
            icon,
            version,
            report,
        } => cmd_merge(&root, &output, name, icon, version, report),
    }
}

fn cmd_scan(roots: &[PathBuf]) -> dm_core::Result<()> {
    let result = scan_mods(roots)?;

    println!("Scanned {} root(s):", result.roots.len());
    for root in &result.roots {
        println!("  {}", root.display());
    }
    println!();
    println!("Found {} mod(s):", result.mods.len());
    for m in &result.mods {
        println!("  {} ({})", m.name, m.path.display());
    }

    Ok(())
}

fn cmd_parse(file: &PathBuf) -> dm_core::Result<()> {
    let text = fs::read_to_string(file).map_err(|e| dm_core::Error::FileRead {
        path: file.clone(),
        source: e,
    })?;
    let name = file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mod")
        .to_string();

    let def = parse_mod(&name, &text)?;

    println!("Mod: {}", def.title());
    if let Some(display) = def.display_name() {
        println!("Display name: {}", display);
    }
    println!();

    for t in EntityType::ALL {
        let d = def.def(t);
        if d.is_empty() {
            continue;
        }
        println!("{}:", t);
        if !d.defined().is_empty() {
            let ids: Vec<String> = d.defined().iter().map(|id| id.to_string()).collect();
            println!("  new: {}", ids.join(", "));
        }
        if !d.vanilla_edits().is_empty() {
            let ids: Vec<String> = d.vanilla_edits().iter().map(|id| id.to_string()).collect();
            println!("  vanilla edits: {}", ids.join(", "));
        }
        if d.implicit_count() > 0 {
            println!("  unnumbered definitions: {}", d.implicit_count());
        }
    }

    Ok(())
}

fn cmd_check(roots: &[PathBuf]) -> dm_core::Result<()> {
    let scan = scan_mods(roots)?;
    let sources = load_sources(&scan.mods)?;

    println!("Checking {} mod(s)...", sources.len());

    let mut defs = Vec::with_capacity(sources.len());
    for source in &sources {
        defs.push(parse_mod(&source.name, &source.text)?);
    }
    let allocation = allocate(&mut defs)?;

    let mut total_remaps = 0;
    for def in &defs {
        if let Some(mapping) = allocation.mappings.get(def.name()) {
            for (entity, from, to) in mapping.iter_remaps() {
                println!("  {}: {} {} -> {}", def.name(), entity, from, to);
                total_remaps += 1;
            }
            for (entity, _index, id) in mapping.iter_implicit() {
                println!("  {}: {} unnumbered -> {}", def.name(), entity, id);
            }
        }
    }
    if total_remaps == 0 {
        println!("  no remaps needed");
    }

    let overlaps: Vec<_> = allocation
        .conflicts
        .iter()
        .filter(|c| c.kind == ConflictKind::VanillaOverlap)
        .collect();
    if !overlaps.is_empty() {
        println!();
        println!("Warnings:");
        for c in overlaps {
            println!(
                "  {} {} edited by: {}",
                c.entity,
                c.id,
                c.mods.join(", ")
            );
        }
    }

    Ok(())
}

fn cmd_merge(
    roots: &[PathBuf],
    output: &PathBuf,
    name: Option<String>,
    icon: Option<String>,
    version: Option<String>,
    report_path: Option<PathBuf>,
) -> dm_core::Result<()> {
    let scan = scan_mods(roots)?;
    let sources = load_sources(&scan.mods)?;

    println!("Merging {} mod(s)...", sources.len());

    let options = MergeOptions {
        name,
        description: None,
        icon,
        version,
    };
    let out = merge(sources, &options)?;

    // the merged text is fully assembled before anything touches disk
    fs::write(output, &out.text)?;
    println!("Wrote {}", output.display());
    println!(
        "  {} remap(s), {} unnumbered assignment(s)",
        out.report.remaps.len(),
        out.report.assigned.len()
    );

    if !out.report.warnings.is_empty() {
        println!();
        println!("Warnings:");
        for w in &out.report.warnings {
            println!("  {}", w);
        }
    }

    if let Some(path) = report_path {
        let json = serde_json::to_string_pretty(&out.report)?;
        fs::write(&path, json)?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
