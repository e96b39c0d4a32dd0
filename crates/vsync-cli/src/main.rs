//! vsync diagnostic CLI.
//!
//! # Quick Start
//!
//! ```bash
//! # Write vsync.toml and the epoch-0 view for node 0 of a three-node group
//! vsync init --id 0 --member 0=10.0.0.1:7000 --member 1=10.0.0.2:7000 --member 2=10.0.0.3:7000
//!
//! # Show a persisted view
//! vsync inspect .vsync/view
//!
//! # Crash two of seven simulated members and watch the survivors reconfigure
//! vsync simulate --size 7 --crash 0 --crash 4 --queued --seed 42
//!
//! # Same run, with counters in Prometheus exposition format
//! vsync simulate --size 7 --crash 0 --crash 4 --queued --metrics prometheus
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// vsync - virtual-synchrony group membership.
#[derive(Parser)]
#[command(name = "vsync")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Write vsync.toml and the epoch-0 view file.
    Init {
        /// Project directory.
        #[arg(short, long, default_value = ".")]
        dir: String,

        /// This node's id.
        #[arg(long)]
        id: u32,

        /// Group member as `id=address`. Repeat once per member.
        #[arg(short, long = "member", required = true)]
        members: Vec<String>,

        /// Overwrite an existing vsync.toml and view file.
        #[arg(long)]
        force: bool,
    },

    /// Print a persisted view.
    Inspect {
        /// View file (the primary, not the `.swp`).
        path: String,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = commands::inspect::Format::Human)]
        format: commands::inspect::Format,
    },

    /// Run a group in-process and report the views it installs.
    Simulate {
        /// Number of members.
        #[arg(short = 'n', long, default_value = "5")]
        size: u32,

        /// Rank to crash before the first round. Repeatable.
        #[arg(short, long = "crash")]
        crashes: Vec<usize>,

        /// RNG seed for queued delivery.
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Deliver table pushes in random order instead of immediately.
        #[arg(long)]
        queued: bool,

        /// Give up after this many rounds.
        #[arg(long, default_value = "500")]
        rounds: u64,

        /// Sleep `membership.poll_interval_ms` between rounds.
        #[arg(long)]
        pace: bool,

        /// Directory holding vsync.toml for membership settings.
        #[arg(long, default_value = ".")]
        config_dir: String,

        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,

        /// Metrics footer format for text output.
        #[arg(long, value_enum, default_value_t = commands::simulate::MetricsFormat::Summary)]
        metrics: commands::simulate::MetricsFormat,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Init {
            dir,
            id,
            members,
            force,
        } => commands::init::run(&dir, id, &members, force),
        Commands::Inspect { path, format } => commands::inspect::run(&path, format),
        Commands::Simulate {
            size,
            crashes,
            seed,
            queued,
            rounds,
            pace,
            config_dir,
            json,
            metrics,
        } => commands::simulate::run(&commands::simulate::SimulateArgs {
            size,
            crashes,
            seed,
            queued,
            rounds,
            pace,
            config_dir,
            json,
            metrics,
        }),
    }
}
