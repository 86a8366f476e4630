//! Execution budget governor: bounds each invocation by wall time and memory.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

/// Default wall-time budget for one invocation.
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(25);

/// Bytes kept free below the memory limit before the governor trips.
pub const MEMORY_SAFETY_MARGIN: u64 = 4_096_000;

/// Memory ceiling for an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MemoryLimit {
    #[default]
    Unlimited,
    Bytes(u64),
}

impl MemoryLimit {
    /// Parse a shorthand limit such as `512`, `64k`, `128M`, `2G` or `-1`.
    ///
    /// Suffixes are binary multiples. Any negative value means unlimited.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }
        if value.starts_with('-') {
            return value[1..]
                .trim_end_matches(|c: char| c.is_ascii_alphabetic())
                .parse::<u64>()
                .ok()
                .map(|_| MemoryLimit::Unlimited);
        }

        let last = value.chars().last()?.to_ascii_lowercase();
        let (digits, multiplier) = match last {
            'g' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
            'm' => (&value[..value.len() - 1], 1024 * 1024),
            'k' => (&value[..value.len() - 1], 1024),
            _ => (value, 1),
        };

        let base: u64 = digits.trim().parse().ok()?;
        base.checked_mul(multiplier).map(MemoryLimit::Bytes)
    }

    /// The usable ceiling once `margin` bytes are reserved.
    ///
    /// `None` means memory never constrains the run.
    pub fn ceiling(&self, margin: u64) -> Option<u64> {
        match self {
            MemoryLimit::Unlimited => None,
            MemoryLimit::Bytes(bytes) => bytes.checked_sub(margin).filter(|c| *c > 0),
        }
    }
}

impl fmt::Display for MemoryLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryLimit::Unlimited => write!(f, "-1"),
            MemoryLimit::Bytes(bytes) => write!(f, "{bytes}"),
        }
    }
}

impl From<MemoryLimit> for String {
    fn from(limit: MemoryLimit) -> Self {
        limit.to_string()
    }
}

impl TryFrom<String> for MemoryLimit {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        MemoryLimit::parse(&value).ok_or_else(|| format!("invalid memory limit: {value}"))
    }
}

/// Reports the current memory usage of the process, in bytes.
pub trait MemoryProbe {
    fn current_usage(&self) -> u64;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> u64,
{
    fn current_usage(&self) -> u64 {
        self()
    }
}

/// Resident memory of the current process, sampled through `sysinfo`.
pub struct ProcessMemory {
    system: Mutex<System>,
    pid: Pid,
}

impl Default for ProcessMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemory {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }
}

impl MemoryProbe for ProcessMemory {
    fn current_usage(&self) -> u64 {
        let Ok(mut system) = self.system.lock() else {
            return 0;
        };
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        system.process(self.pid).map(|p| p.memory()).unwrap_or(0)
    }
}

/// The time and memory envelope of a single invocation.
///
/// Duration is the primary guard. Memory is an emergency stop: once usage
/// reaches the ceiling the budget reports exceeded regardless of elapsed time.
pub struct ExecutionBudget {
    started: Instant,
    max_duration: Duration,
    memory_ceiling: Option<u64>,
    probe: Box<dyn MemoryProbe>,
}

impl ExecutionBudget {
    /// Start a budget anchored at now, probing the current process' memory.
    pub fn start(max_duration: Duration, memory_limit: MemoryLimit, safety_margin: u64) -> Self {
        Self::with_probe(
            max_duration,
            memory_limit,
            safety_margin,
            Box::new(ProcessMemory::new()),
        )
    }

    /// Start a budget anchored at now with a custom memory probe.
    pub fn with_probe(
        max_duration: Duration,
        memory_limit: MemoryLimit,
        safety_margin: u64,
        probe: Box<dyn MemoryProbe>,
    ) -> Self {
        Self {
            started: Instant::now(),
            max_duration,
            memory_ceiling: memory_limit.ceiling(safety_margin),
            probe,
        }
    }

    /// A budget that never runs out.
    pub fn unbounded() -> Self {
        Self::with_probe(Duration::MAX, MemoryLimit::Unlimited, 0, Box::new(|| 0u64))
    }

    /// Whether this invocation must stop and leave the rest to the next one.
    pub fn exceeded(&self) -> bool {
        if let Some(ceiling) = self.memory_ceiling {
            if self.probe.current_usage() >= ceiling {
                return true;
            }
        }
        self.elapsed() >= self.max_duration
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Bytes left before the memory ceiling; `None` when memory is unconstrained.
    pub fn memory_headroom(&self) -> Option<i64> {
        self.memory_ceiling.map(|ceiling| {
            let usage = i64::try_from(self.probe.current_usage()).unwrap_or(i64::MAX);
            i64::try_from(ceiling)
                .unwrap_or(i64::MAX)
                .saturating_sub(usage)
        })
    }
}

impl fmt::Debug for ExecutionBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionBudget")
            .field("elapsed", &self.elapsed())
            .field("max_duration", &self.max_duration)
            .field("memory_ceiling", &self.memory_ceiling)
            .finish()
    }
}
