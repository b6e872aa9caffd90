use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Control-plane tool for a user-space CPU scheduler.
///
/// Publishes scheduler identity and tunables into the shared region,
/// drives the queued/scheduled handoff, and can stand in for the kernel
/// side when exercising a region file by hand.
#[derive(Parser, Debug)]
#[command(name = "schedctl", version, about = "Control-plane tool for a user-space CPU scheduler")]
pub struct CliArgs {
    /// Path to a TOML config file (env vars and .env are used when unset)
    #[arg(long, env = "USERSCHED_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Region file override
    #[arg(long, global = true)]
    pub region: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a fresh region file and publish the configuration into it
    Init,

    /// Print configuration, counters and exit record as JSON
    Show,

    /// Run the claim/complete loop until the kernel side exits.
    /// Configuration is left as `init` published it.
    Run {
        /// Stop after this many polling ticks
        #[arg(long)]
        iterations: Option<u64>,

        /// How long to wait for scheduler_pid to become visible
        #[arg(long, default_value_t = 5000)]
        wait_ms: u64,
    },

    /// Kernel side: add queued tasks
    Enqueue {
        /// Number of tasks to enqueue
        #[arg(default_value_t = 1)]
        count: u64,
    },

    /// Kernel side: record an exit
    Exit {
        /// Raw exit kind (64 = unregistered, 1024 = error)
        #[arg(long, default_value_t = 64)]
        kind: i32,

        #[arg(long, default_value_t = 0)]
        code: i64,

        /// Pid of the task that triggered the exit
        #[arg(long, default_value_t = 0)]
        paid: u32,

        #[arg(long, default_value = "")]
        reason: String,

        #[arg(long, default_value = "")]
        message: String,
    },

    /// Print the CPU cache domains (L2/L3) of this machine as JSON
    Topology,
}
