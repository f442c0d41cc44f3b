mod commands;
mod config;
mod console;
mod features;
mod input;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(version, about = "Live memory inspector for an external process")]
struct Cli {
    /// Enable debug logging for tether crates
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Attach to the target and follow its sessions until quit
    Run {
        /// Offset table (JSON)
        #[arg(short, long, default_value = "offsets.json")]
        offsets: PathBuf,

        /// Runtime configuration (TOML)
        #[arg(short, long, default_value = "tether.toml", env = "TETHER_CONFIG")]
        config: PathBuf,

        /// Override the process name from the offset table
        #[arg(short, long)]
        process: Option<String>,
    },

    /// Dump raw bytes from the target
    Hexdump {
        /// Address (hex, with or without 0x prefix)
        address: String,

        /// Number of bytes to read
        #[arg(short, long, default_value_t = 256)]
        size: usize,

        /// Open this pid instead of searching by name
        #[arg(long)]
        pid: Option<u32>,

        /// Process name to search for
        #[arg(long, default_value = "target.exe")]
        process: String,

        /// Hide the ASCII column
        #[arg(long)]
        no_ascii: bool,
    },

    /// Manage offset tables
    Offsets {
        /// Write a template offset table to this path
        #[arg(long)]
        init: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("tether={level}").parse()?)
                .add_directive(format!("tether_cli={level}").parse()?),
        )
        .init();

    match cli.command {
        Command::Run {
            offsets,
            config,
            process,
        } => commands::run::run(&offsets, &config, process),
        Command::Hexdump {
            address,
            size,
            pid,
            process,
            no_ascii,
        } => commands::hexdump::run(&address, size, pid, &process, !no_ascii),
        Command::Offsets { init, force } => commands::offsets::run(&init, force),
    }
}
