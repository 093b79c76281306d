use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    ratchet_migrate::{
        Coordinator, LayoutVersion, TreeReport, UpgradeOptions, UpgradeReport, UpgradeStatus,
    },
    tracing::debug,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ratchet", about = "Ratchet — plan-driven scaffolding for agent projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Project root (defaults to the current directory).
    #[arg(long, global = true, env = "RATCHET_ROOT")]
    root: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Upgrade the project layout to the current version.
    Upgrade {
        /// Show what would change without touching the tree.
        #[arg(long)]
        dry_run: bool,
        /// Skip confirmation; also assume the oldest layout when the
        /// tree's version cannot be detected.
        #[arg(long)]
        force: bool,
        /// Upgrade to this layout version instead of the latest.
        #[arg(long)]
        target: Option<LayoutVersion>,
        /// Upgrade the primary tree only, leaving worktrees alone.
        #[arg(long)]
        no_worktrees: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show detected layout versions and pending migrations.
    Status {
        /// Primary tree only.
        #[arg(long)]
        no_worktrees: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.clone()));
    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let root = match &cli.root {
        Some(root) => root.clone(),
        None => std::env::current_dir().context("cannot determine current directory")?,
    };
    debug!(root = %root.display(), "resolved project root");

    let code = match cli.command {
        Commands::Upgrade {
            dry_run,
            force,
            target,
            no_worktrees,
            json,
        } => {
            let opts = UpgradeOptions {
                target: target.unwrap_or(ratchet_migrate::CURRENT_VERSION),
                dry_run,
                force,
                include_worktrees: !no_worktrees,
            };
            run_upgrade(&root, &opts, json).await?
        },
        Commands::Status { no_worktrees, json } => {
            run_status(&root, !no_worktrees, json).await?
        },
    };

    std::process::exit(code);
}

async fn run_upgrade(root: &std::path::Path, opts: &UpgradeOptions, json: bool) -> anyhow::Result<i32> {
    let coordinator = Coordinator::new();

    if !opts.dry_run && !opts.force {
        let statuses = coordinator.status(root, opts.include_worktrees).await?;
        let pending: usize = statuses.iter().map(|s| s.pending.len()).sum();
        if pending == 0 {
            println!("Already up to date; metadata will be refreshed.");
        } else {
            println!("Pending migrations:");
            for status in &statuses {
                for id in &status.pending {
                    println!("  {}  ({})", id, status.root.display());
                }
            }
        }
        if !confirm("Proceed with upgrade? [y/N] ")? {
            println!("Aborted.");
            return Ok(1);
        }
    }

    let report = coordinator.upgrade(root, opts).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report, opts.dry_run);
    }
    Ok(report.status().exit_code())
}

async fn run_status(root: &std::path::Path, include_worktrees: bool, json: bool) -> anyhow::Result<i32> {
    let statuses = Coordinator::new().status(root, include_worktrees).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(0);
    }
    for status in &statuses {
        let version = status
            .detection
            .version()
            .map_or_else(|| "unknown".to_string(), |v| v.to_string());
        println!("{}", status.root.display());
        println!(
            "  layout {version}, metadata {}",
            if status.metadata_present { "present" } else { "absent" }
        );
        if status.pending.is_empty() {
            println!("  up to date");
        } else {
            println!("  pending: {}", status.pending.join(", "));
        }
    }
    Ok(0)
}

fn print_report(report: &UpgradeReport, dry_run: bool) {
    let verb = if dry_run { "would apply" } else { "applied" };
    print_tree(&report.primary, verb);
    for wt in &report.worktrees {
        print_tree(wt, verb);
    }
    match report.status() {
        UpgradeStatus::Success => println!("Done."),
        UpgradeStatus::PrimaryFailed => println!("Upgrade failed."),
        UpgradeStatus::WorktreeFailures => {
            println!("Primary upgraded; some worktrees failed (see above).");
        },
    }
}

fn print_tree(tree: &TreeReport, verb: &str) {
    println!("{}", tree.root.display());
    if tree.applied.is_empty() {
        println!("  {verb}: nothing");
    } else {
        println!("  {verb}: {}", tree.applied.join(", "));
    }
    for change in &tree.changes {
        println!("    {change}");
    }
    for skipped in &tree.skipped {
        println!("  skipped {}: {}", skipped.id, skipped.reason);
    }
    if let Some(error) = &tree.error {
        println!("  error: {error}");
    }
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt}");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let answer = line.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
