use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SchedError;
use crate::procfs;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str) -> Option<T> {
    profiled_env_opt(profile, key).and_then(|v| v.trim().parse().ok())
}

fn profiled_env_bool(profile: &str, key: &str) -> Option<bool> {
    profiled_env_opt(profile, key).and_then(|v| parse_bool(&v))
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

// ── Defaults ──────────────────────────────────────────────────

fn default_region_path() -> PathBuf {
    PathBuf::from("/dev/shm/usersched.region")
}

fn default_exempt_comm() -> Option<String> {
    Some("khugepaged".to_string())
}

/// 20ms.
fn default_slice_ns() -> u64 {
    20_000_000
}

fn default_poll_interval_ms() -> u64 {
    10
}

// ── Top-level config ──────────────────────────────────────────

/// Start-of-day configuration for a user-space scheduler session.
///
/// Everything here is written into the shared configuration block once,
/// before the kernel side starts consuming it. The two live counters are
/// not configuration and never appear here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedConfig {
    /// Active profile name (empty = default).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub profile: String,

    /// Backing file for the shared region.
    #[serde(default = "default_region_path")]
    pub region_path: PathBuf,

    /// Authoritative scheduler pid. `None` = this process.
    #[serde(default)]
    pub scheduler_pid: Option<u32>,

    /// Pid excluded from user-space scheduling. Takes precedence over `exempt_comm`.
    #[serde(default)]
    pub exempt_pid: Option<u32>,

    /// Process name looked up in /proc when `exempt_pid` is not set.
    #[serde(default = "default_exempt_comm")]
    pub exempt_comm: Option<String>,

    #[serde(default)]
    pub early_processing: bool,

    /// Default time slice in nanoseconds.
    #[serde(default = "default_slice_ns")]
    pub default_slice_ns: u64,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub builtin_idle: bool,

    /// How often the steady-state loop polls the live counters.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            profile: String::new(),
            region_path: default_region_path(),
            scheduler_pid: None,
            exempt_pid: None,
            exempt_comm: default_exempt_comm(),
            early_processing: false,
            default_slice_ns: default_slice_ns(),
            debug: false,
            builtin_idle: false,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SchedConfig {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `USERSCHED_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Result<Self, SchedError> {
        let profile = env_opt("USERSCHED_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Result<Self, SchedError> {
        let mut config = Self {
            profile: profile.to_uppercase(),
            ..Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse config from a TOML string, then apply environment overrides.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.profile = config.profile.to_uppercase();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    // ── Environment variable overrides ──────────────────────────

    /// Apply `USERSCHED_*` overrides (profiled). Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        let p = self.profile.clone();
        let p = p.as_str();

        if let Some(v) = profiled_env_opt(p, "USERSCHED_REGION_PATH") {
            self.region_path = PathBuf::from(v);
        }
        if let Some(v) = profiled_env_parse(p, "USERSCHED_SCHEDULER_PID") {
            self.scheduler_pid = Some(v);
        }
        if let Some(v) = profiled_env_parse(p, "USERSCHED_EXEMPT_PID") {
            self.exempt_pid = Some(v);
        }
        if let Some(v) = profiled_env_opt(p, "USERSCHED_EXEMPT_COMM") {
            self.exempt_comm = if v == "-" { None } else { Some(v) };
        }
        if let Some(v) = profiled_env_bool(p, "USERSCHED_EARLY_PROCESSING") {
            self.early_processing = v;
        }
        if let Some(v) = profiled_env_parse(p, "USERSCHED_DEFAULT_SLICE_NS") {
            self.default_slice_ns = v;
        }
        if let Some(v) = profiled_env_bool(p, "USERSCHED_DEBUG") {
            self.debug = v;
        }
        if let Some(v) = profiled_env_bool(p, "USERSCHED_BUILTIN_IDLE") {
            self.builtin_idle = v;
        }
        if let Some(v) = profiled_env_parse(p, "USERSCHED_POLL_INTERVAL_MS") {
            self.poll_interval_ms = v;
        }
    }

    // ── Validation ──────────────────────────────────────────────

    pub fn validate(&self) -> Result<(), SchedError> {
        if self.default_slice_ns == 0 {
            return Err(SchedError::Config(
                "default_slice_ns must be greater than zero".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(SchedError::Config(
                "poll_interval_ms must be greater than zero".into(),
            ));
        }
        if self.region_path.as_os_str().is_empty() {
            return Err(SchedError::Config("region_path is empty".into()));
        }
        Ok(())
    }

    // ── Resolution ──────────────────────────────────────────────

    /// The pid to publish as authoritative scheduler.
    pub fn resolved_scheduler_pid(&self) -> u32 {
        self.scheduler_pid.unwrap_or_else(std::process::id)
    }

    /// The pid to publish as exempt, 0 when none is configured or found.
    pub fn resolved_exempt_pid(&self) -> u32 {
        if let Some(pid) = self.exempt_pid {
            return pid;
        }
        self.exempt_comm
            .as_deref()
            .and_then(procfs::find_pid_by_comm)
            .unwrap_or(0)
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  region:      {}", self.region_path.display());
        tracing::info!(
            "  identity:    scheduler_pid={}, exempt_pid={:?}, exempt_comm={}",
            self.resolved_scheduler_pid(),
            self.exempt_pid,
            self.exempt_comm.as_deref().unwrap_or("(none)")
        );
        tracing::info!(
            "  policy:      slice={}ns, early_processing={}, builtin_idle={}, debug={}",
            self.default_slice_ns,
            self.early_processing,
            self.builtin_idle,
            self.debug
        );
        tracing::info!("  loop:        poll_interval={}ms", self.poll_interval_ms);
    }
}
