use serde::Deserialize;
use std::time::Duration;

/// How the worker pool is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    /// One worker per available processor, spawned up front.
    Fixed,
    /// Workers are spawned on demand and retire after `keep_alive_ms` idle.
    #[default]
    Dynamic,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub mode: PoolMode,
    /// Worker count for `fixed` mode; defaults to the available parallelism.
    #[serde(default)]
    pub threads: Option<usize>,
    /// Upper bound on live workers in `dynamic` mode.
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default = "default_keep_alive_ms")]
    pub keep_alive_ms: u64,
}

fn default_max_threads() -> usize {
    64
}

fn default_keep_alive_ms() -> u64 {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            mode: PoolMode::default(),
            threads: None,
            max_threads: default_max_threads(),
            keep_alive_ms: default_keep_alive_ms(),
        }
    }
}

impl SchedulerConfig {
    pub fn fixed(threads: usize) -> Self {
        SchedulerConfig {
            mode: PoolMode::Fixed,
            threads: Some(threads),
            ..Default::default()
        }
    }

    pub fn dynamic() -> Self {
        SchedulerConfig::default()
    }

    /// Workers to start with (fixed) or the ceiling (dynamic), never zero.
    pub(crate) fn worker_limit(&self) -> usize {
        let n = match self.mode {
            PoolMode::Fixed => self.threads.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4)
            }),
            PoolMode::Dynamic => self.max_threads,
        };
        n.max(1)
    }

    pub(crate) fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let cfg: SchedulerConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(cfg.mode, PoolMode::Dynamic);
        assert_eq!(cfg.max_threads, 64);
        assert_eq!(cfg.keep_alive(), Duration::from_secs(10));
    }

    #[test]
    fn test_fixed_mode_from_yaml() {
        let cfg: SchedulerConfig = serde_yaml::from_str("mode: fixed\nthreads: 3\n").unwrap();
        assert_eq!(cfg.mode, PoolMode::Fixed);
        assert_eq!(cfg.worker_limit(), 3);
    }

    #[test]
    fn test_fixed_mode_defaults_to_available_parallelism() {
        let cfg: SchedulerConfig = serde_yaml::from_str("mode: fixed\n").unwrap();
        assert_eq!(cfg.threads, None);
        let cpus = std::thread::available_parallelism().unwrap().get();
        assert_eq!(cfg.worker_limit(), cpus);
    }

    #[test]
    fn test_worker_limit_never_zero() {
        assert_eq!(SchedulerConfig::fixed(0).worker_limit(), 1);
        let cfg = SchedulerConfig {
            max_threads: 0,
            ..SchedulerConfig::dynamic()
        };
        assert_eq!(cfg.worker_limit(), 1);
    }
}
