//! Resource limit normalization and ulimit derivation.
//!
//! `LimitSpec` holds semantic scalars, not engine types; conversion to
//! the engine's ulimit array happens at host-config assembly time in
//! `lifecycle.rs`.

use serde::Deserialize;

const CPU_TO_REAL_TIME_FACTOR: i64 = 5;

/// Caller-supplied overrides; every field absent means "use the default".
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsOverride {
    pub cputime: Option<i64>,
    pub realtime: Option<i64>,
    pub memory: Option<i64>,
    pub processes: Option<i64>,
    pub file_size: Option<i64>,
}

impl LimitsOverride {
    /// Parse limits from the loosely-typed JSON shape callers send
    /// (`{cputime, realtime, memory, processes|pids-limit, file_size}`).
    /// Unrecognized keys are ignored.
    pub fn from_json(value: &serde_json::Value) -> Self {
        let get = |key: &str| value.get(key).and_then(|v| v.as_i64());
        LimitsOverride {
            cputime: get("cputime"),
            realtime: get("realtime"),
            memory: get("memory"),
            processes: get("processes").or_else(|| get("pids-limit")),
            file_size: get("file_size"),
        }
    }
}

/// Normalized, fully-defaulted resource limits for one sandbox run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitSpec {
    pub cputime_s: Option<i64>,
    pub realtime_s: Option<i64>,
    pub memory_mb: Option<i64>,
    pub processes: Option<i64>,
    pub file_size_bytes: Option<i64>,
}

impl LimitSpec {
    /// `cputime=1s, realtime=5s, memory=64MB, processes=unset, file_size=unset`.
    pub fn defaults() -> Self {
        LimitSpec {
            cputime_s: Some(1),
            realtime_s: Some(5),
            memory_mb: Some(64),
            processes: None,
            file_size_bytes: None,
        }
    }

    /// Merge caller overrides onto the defaults. `realtime` is
    /// auto-derived as `cputime × 5` whenever the caller omits it,
    /// regardless of whether `cputime` itself is a default or an
    /// override — this runs off the *resolved* cputime, not just a
    /// caller-supplied one.
    pub fn merge(overrides: &LimitsOverride) -> Self {
        let defaults = Self::defaults();
        let cputime_s = overrides.cputime.or(defaults.cputime_s);
        let realtime_s = overrides
            .realtime
            .or_else(|| cputime_s.map(|c| c * CPU_TO_REAL_TIME_FACTOR))
            .or(defaults.realtime_s);
        LimitSpec {
            cputime_s,
            realtime_s,
            memory_mb: overrides.memory.or(defaults.memory_mb),
            processes: overrides.processes.or(defaults.processes),
            file_size_bytes: overrides.file_size.or(defaults.file_size_bytes),
        }
    }

    /// Ulimits to attach to the container's host-config.
    /// `processes` is passed separately via `pids_limit`, not as a ulimit.
    pub fn ulimits(&self) -> Vec<Ulimit> {
        let mut out = Vec::new();
        if let Some(cpu) = self.cputime_s {
            out.push(Ulimit {
                name: "cpu",
                soft: cpu,
                hard: cpu,
            });
        }
        if let Some(fsize) = self.file_size_bytes {
            out.push(Ulimit {
                name: "fsize",
                soft: fsize,
                hard: fsize,
            });
        }
        out
    }

    /// `mem_limit` / `memswap_limit` in bytes, equal values (swap disabled).
    pub fn memory_bytes(&self) -> Option<i64> {
        self.memory_mb.map(|mb| mb * 1024 * 1024)
    }

    /// `pids_limit` host-config value. `-1` and `None` both mean unlimited.
    pub fn pids_limit(&self) -> Option<i64> {
        match self.processes {
            Some(-1) | None => None,
            Some(n) => Some(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ulimit {
    pub name: &'static str,
    pub soft: i64,
    pub hard: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_on_empty_overrides_is_identity() {
        assert_eq!(LimitSpec::merge(&LimitsOverride::default()), LimitSpec::defaults());
    }

    #[test]
    fn realtime_derives_from_resolved_cputime() {
        let overrides = LimitsOverride {
            cputime: Some(10),
            ..Default::default()
        };
        let merged = LimitSpec::merge(&overrides);
        assert_eq!(merged.realtime_s, Some(50));
    }

    #[test]
    fn explicit_realtime_is_not_overridden() {
        let overrides = LimitsOverride {
            cputime: Some(10),
            realtime: Some(1),
            ..Default::default()
        };
        let merged = LimitSpec::merge(&overrides);
        assert_eq!(merged.realtime_s, Some(1));
    }

    #[test]
    fn ulimits_include_cpu_and_fsize_when_present() {
        let overrides = LimitsOverride {
            file_size: Some(4096),
            ..Default::default()
        };
        let merged = LimitSpec::merge(&overrides);
        let ulimits = merged.ulimits();
        assert!(ulimits.iter().any(|u| u.name == "cpu"));
        assert!(ulimits.iter().any(|u| u.name == "fsize" && u.soft == 4096));
    }

    #[test]
    fn pids_limit_treats_unset_and_negative_one_as_unlimited() {
        assert_eq!(LimitSpec::defaults().pids_limit(), None);
        let overrides = LimitsOverride {
            processes: Some(-1),
            ..Default::default()
        };
        assert_eq!(LimitSpec::merge(&overrides).pids_limit(), None);
        let overrides = LimitsOverride {
            processes: Some(32),
            ..Default::default()
        };
        assert_eq!(LimitSpec::merge(&overrides).pids_limit(), Some(32));
    }

    #[test]
    fn from_json_accepts_pids_limit_alias() {
        let value = serde_json::json!({"pids-limit": 12});
        let overrides = LimitsOverride::from_json(&value);
        assert_eq!(overrides.processes, Some(12));
    }
}
