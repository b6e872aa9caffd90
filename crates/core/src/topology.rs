//! CPU cache topology from sysfs.
//!
//! A cache domain is a set of CPUs sharing one L2 or L3 cache, keyed by the
//! kernel's `shared_cpu_list` string (e.g. `"0-3,8"`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::SchedError;

const SYSFS_CPU_ROOT: &str = "/sys/devices/system/cpu";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheLevel {
    L2,
    L3,
}

impl CacheLevel {
    /// The `cache/indexN` directory describing this level.
    fn sysfs_index(self) -> u32 {
        match self {
            CacheLevel::L2 => 2,
            CacheLevel::L3 => 3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheDomains {
    pub l2: BTreeMap<String, Vec<u32>>,
    pub l3: BTreeMap<String, Vec<u32>>,
}

impl CacheDomains {
    pub fn domains(&self, level: CacheLevel) -> &BTreeMap<String, Vec<u32>> {
        match level {
            CacheLevel::L2 => &self.l2,
            CacheLevel::L3 => &self.l3,
        }
    }

    fn domains_mut(&mut self, level: CacheLevel) -> &mut BTreeMap<String, Vec<u32>> {
        match level {
            CacheLevel::L2 => &mut self.l2,
            CacheLevel::L3 => &mut self.l3,
        }
    }

    /// CPUs sharing the `level` cache with `cpu`, including `cpu` itself.
    pub fn siblings(&self, level: CacheLevel, cpu: u32) -> Option<&[u32]> {
        self.domains(level)
            .values()
            .find(|cpus| cpus.contains(&cpu))
            .map(Vec::as_slice)
    }
}

/// Parse a kernel CPU list such as `"0-3,8,10-11"`.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>, SchedError> {
    let mut cpus = Vec::new();
    for segment in list.split(',').map(str::trim) {
        match segment.split_once('-') {
            Some((start, end)) => {
                let start = parse_cpu(start, "start of range")?;
                let end = parse_cpu(end, "end of range")?;
                if start > end {
                    return Err(SchedError::Topology(format!(
                        "start greater than end in range: {segment}"
                    )));
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(parse_cpu(segment, "number")?),
        }
    }
    Ok(cpus)
}

fn parse_cpu(raw: &str, what: &str) -> Result<u32, SchedError> {
    raw.parse()
        .map_err(|_| SchedError::Topology(format!("invalid {what}: {raw:?}")))
}

/// Cache domains of the running system.
pub fn system_cache_domains() -> Result<CacheDomains, SchedError> {
    cache_domains(Path::new(SYSFS_CPU_ROOT))
}

/// Collect L2/L3 domains from `<root>/cpuN/cache/index{2,3}/shared_cpu_list`.
///
/// CPUs without a given cache level are skipped, as are lists that fail to
/// parse. Other read errors are returned.
pub fn cache_domains(root: &Path) -> Result<CacheDomains, SchedError> {
    let mut domains = CacheDomains::default();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let name = entry.file_name();
        let is_cpu = name
            .to_str()
            .and_then(|n| n.strip_prefix("cpu"))
            .is_some_and(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()));
        if !is_cpu {
            continue;
        }

        for level in [CacheLevel::L2, CacheLevel::L3] {
            let path = entry
                .path()
                .join("cache")
                .join(format!("index{}", level.sysfs_index()))
                .join("shared_cpu_list");
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let key = content.trim();
            match parse_cpu_list(key) {
                Ok(cpus) => {
                    domains.domains_mut(level).insert(key.to_string(), cpus);
                }
                Err(e) => debug!(path = %path.display(), error = %e, "skipping cache list"),
            }
        }
    }

    Ok(domains)
}
