mod cli;
mod run;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

use usersched_core::config::load_dotenv;
use usersched_core::{procfs, topology, SchedConfig};
use usersched_skel::{ExitKind, KernelPeer, MmapObject, Session, UserExitInfo};

use crate::cli::{CliArgs, Command};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    load_dotenv();
    let args = CliArgs::parse();

    let mut config = match args.config.as_deref() {
        Some(path) => SchedConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => SchedConfig::from_env().context("failed to load config from environment")?,
    };
    if let Some(region) = args.region {
        config.region_path = region;
    }

    match args.command {
        Command::Init => init(&config),
        Command::Show => show(&config.region_path),
        Command::Run { iterations, wait_ms } => run(&config, iterations, wait_ms),
        Command::Enqueue { count } => enqueue(&config.region_path, count),
        Command::Exit {
            kind,
            code,
            paid,
            reason,
            message,
        } => exit(
            &config.region_path,
            UserExitInfo {
                kind: ExitKind::from_raw(kind),
                paid,
                exit_code: code,
                reason,
                message,
            },
        ),
        Command::Topology => show_topology(),
    }
}

fn open_session(path: &Path) -> Result<Session> {
    let region = path.to_path_buf();
    Session::open(move || MmapObject::open(region)).with_context(|| {
        format!(
            "failed to open scheduler session on {} (run `schedctl init` first?)",
            path.display()
        )
    })
}

fn init(config: &SchedConfig) -> Result<()> {
    config.log_summary();
    let region = config.region_path.clone();
    let mut session = Session::open(move || MmapObject::create(region))
        .context("failed to create scheduler session")?;
    session.apply(config);
    session.destroy();
    println!("{}", config.region_path.display());
    Ok(())
}

fn show(path: &Path) -> Result<()> {
    let session = open_session(path)?;
    let report = serde_json::json!({
        "region": path,
        "config": session.config_snapshot(),
        "counters": session.counters(),
        "exit": session.exit_info(),
    });
    session.destroy();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run(config: &SchedConfig, iterations: Option<u64>, wait_ms: u64) -> Result<()> {
    info!(region = %config.region_path.display(), "attaching to published region");
    let mut session = open_session(&config.region_path)?;

    let interval = Duration::from_millis(config.poll_interval_ms);
    let Some(pid) =
        run::wait_for_scheduler_pid(&session, Duration::from_millis(wait_ms), interval)
    else {
        session.destroy();
        bail!("scheduler_pid still unset after {wait_ms}ms");
    };
    if !procfs::pid_is_live(pid) {
        warn!(pid, "published scheduler_pid does not refer to a running process");
    }
    info!(pid, "scheduler identity visible, entering handoff loop");

    let stats = run::run_loop(&mut session, interval, iterations);
    session.destroy();
    println!("{}", serde_json::to_string(&stats)?);
    Ok(())
}

fn attach_peer(path: &Path) -> Result<KernelPeer> {
    let object = MmapObject::open(path)
        .with_context(|| format!("failed to map {}", path.display()))?;
    KernelPeer::attach(object).context("region file is not usable")
}

fn enqueue(path: &Path, count: u64) -> Result<()> {
    let peer = attach_peer(path)?;
    let queued = peer.enqueue(count);
    peer.detach();
    let queued = queued.context("enqueue rejected")?;
    println!("{queued}");
    Ok(())
}

fn exit(path: &Path, info: UserExitInfo) -> Result<()> {
    let peer = attach_peer(path)?;
    peer.exit_with(&info);
    peer.detach();
    Ok(())
}

fn show_topology() -> Result<()> {
    let domains = topology::system_cache_domains().context("failed to read cache topology")?;
    info!(l2 = domains.l2.len(), l3 = domains.l3.len(), "cache domains");
    println!("{}", serde_json::to_string_pretty(&domains)?);
    Ok(())
}
