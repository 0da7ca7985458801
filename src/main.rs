use clap::{Args, Parser, Subcommand};
use gadget_snap::config::{DropScope, OpaquePolicy, PipelineConfig};
use gadget_snap::framing::FramingKind;
use gadget_snap::report::RunReport;
use gadget_snap::runner::{check_outputs, part_count, part_paths, run, FsOpener, StreamOpener};
use gadget_snap::TagRegistry;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gsnap", about = "Inspect and filter Gadget snapshot files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the block layout, header and per-type value ranges
    Inspect {
        snapshot: PathBuf,
        #[command(flatten)]
        opts: CommonOpts,
    },
    /// Copy a snapshot keeping only allowed tags
    Filter {
        src: PathBuf,
        dst: PathBuf,
        #[command(flatten)]
        opts: CommonOpts,
        /// Comma-separated tags to keep, e.g. HEAD,POS,MASS
        #[arg(short, long, conflicts_with = "all")]
        allow: Option<String>,
        /// Keep every tag
        #[arg(long)]
        all: bool,
        /// Also drop the record following a rejected one
        #[arg(long, value_enum)]
        drop_scope: Option<DropScope>,
        /// Untagged legacy blocks that are not headers: forward or drop
        #[arg(long, value_enum)]
        opaque: Option<OpaquePolicy>,
        /// Overwrite DST without asking
        #[arg(short, long)]
        force: bool,
    },
}

#[derive(Args)]
struct CommonOpts {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Block framing: auto (default), tagged, legacy
    #[arg(long, value_enum)]
    framing: Option<FramingKind>,
    /// Only process the named file even if the header lists more parts
    #[arg(long)]
    no_parts: bool,
    /// Emit the report as JSON
    #[arg(long)]
    json: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    match Cli::parse().command {

        // ── Inspect ──────────────────────────────────────────────────────────
        Commands::Inspect { snapshot, opts } => {
            let config = load_config(&opts)?;
            let report = run(&mut FsOpener, &config, &snapshot, None)?;
            print_report(&report, opts.json)?;
        }

        // ── Filter ───────────────────────────────────────────────────────────
        Commands::Filter { src, dst, opts, allow, all, drop_scope, opaque, force } => {
            let mut config = load_config(&opts)?;
            if all {
                config.allowed_tags = TagRegistry::universal();
            } else if let Some(list) = allow {
                config.allowed_tags = TagRegistry::parse_list(&list)?;
            }
            if let Some(scope) = drop_scope {
                config.drop_scope = scope;
            }
            if let Some(policy) = opaque {
                config.opaque = policy;
            }

            // Every part's output is checked before anything is written.
            let count = part_count(&config, &mut FsOpener.open_input(&src)?)?;
            let parts = part_paths(&src, Some(&dst), count);
            check_outputs(&FsOpener, &parts)?;
            for out in parts.iter().filter_map(|p| p.output.as_deref()) {
                if out.exists() && !force && !confirm_overwrite(out)? {
                    println!("Not overwriting {}", out.display());
                    return Ok(());
                }
            }

            let report = run(&mut FsOpener, &config, &src, Some(&dst))?;
            print_report(&report, opts.json)?;
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn load_config(opts: &CommonOpts) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    let mut config = match &opts.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None       => PipelineConfig::default(),
    };
    if let Some(framing) = opts.framing {
        config.framing = framing;
    }
    if opts.no_parts {
        config.follow_parts = false;
    }
    Ok(config)
}

fn print_report(report: &RunReport, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

fn confirm_overwrite(path: &Path) -> io::Result<bool> {
    print!("{} exists. Overwrite? [y/N] ", path.display());
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}
