use crate::error::{EngineError, Result};

/// Severity threshold for the engine's structured logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub(crate) fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Top-level engine configuration. Mirrors the recognised option set: validated eagerly by
/// [`Config::validate`] so a misconfigured run is refused before any worker thread starts.
#[derive(Debug, Clone)]
pub struct Config {
    /// Number of logical processes. Required, must be >= 1.
    pub lps: usize,
    /// Worker thread count. 0 means "all cores", capped by what's actually available.
    pub n_threads: usize,
    /// Virtual-time limit. `None` means unbounded (an explicit `stop()` or model-side
    /// `can_end` must terminate the run).
    pub termination_time: Option<u64>,
    /// Milliseconds between GVT reductions.
    pub gvt_period_ms: u64,
    /// Fixed checkpoint interval in events. `0` activates the autonomic controller.
    pub ckpt_interval: u64,
    /// Logging severity threshold.
    pub log_level: LogLevel,
    /// Path prefix for statistics output. `None` disables the statistics sink.
    pub stats_file: Option<String>,
    /// Pin worker threads to cores.
    pub core_binding: bool,
    /// Use the sequential reference engine instead of the optimistic one.
    pub serial: bool,
}

impl Config {
    pub fn new(lps: usize) -> Self {
        Self {
            lps,
            n_threads: 0,
            termination_time: None,
            gvt_period_ms: 200,
            ckpt_interval: 0,
            log_level: LogLevel::Info,
            stats_file: None,
            core_binding: false,
            serial: false,
        }
    }

    pub fn with_n_threads(mut self, n: usize) -> Self {
        self.n_threads = n;
        self
    }

    pub fn with_termination_time(mut self, time: u64) -> Self {
        self.termination_time = Some(time);
        self
    }

    pub fn with_gvt_period_ms(mut self, ms: u64) -> Self {
        self.gvt_period_ms = ms;
        self
    }

    pub fn with_ckpt_interval(mut self, interval: u64) -> Self {
        self.ckpt_interval = interval;
        self
    }

    pub fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub fn with_stats_file(mut self, path: impl Into<String>) -> Self {
        self.stats_file = Some(path.into());
        self
    }

    pub fn with_core_binding(mut self, yes: bool) -> Self {
        self.core_binding = yes;
        self
    }

    pub fn with_serial(mut self, yes: bool) -> Self {
        self.serial = yes;
        self
    }

    /// Resolve `n_threads == 0` ("all cores") against what's actually available, and refuse
    /// configurations that over-subscribe (more worker threads requested than LPs to run,
    /// or more than the platform can provide).
    pub fn resolved_n_threads(&self) -> usize {
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let requested = if self.n_threads == 0 {
            available
        } else {
            self.n_threads
        };
        requested.min(available).min(self.lps.max(1))
    }

    /// Validate the configuration. Called once by the engine builder before any thread is
    /// spawned; a bad configuration never starts partial work.
    pub fn validate(&self) -> Result<()> {
        if self.lps == 0 {
            return Err(EngineError::Config("`lps` must be >= 1".into()));
        }
        let available = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        if self.n_threads > available {
            return Err(EngineError::Config(format!(
                "requested {} worker threads but only {available} are available",
                self.n_threads
            )));
        }
        if self.n_threads > self.lps {
            return Err(EngineError::Config(format!(
                "requested {} worker threads for only {} LPs",
                self.n_threads, self.lps
            )));
        }
        if self.gvt_period_ms == 0 {
            return Err(EngineError::Config("`gvt_period_ms` must be > 0".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_lps() {
        let cfg = Config::new(0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_oversubscription() {
        let cfg = Config::new(2).with_n_threads(64);
        if std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1) < 64 {
            assert!(cfg.validate().is_err());
        }
    }

    #[test]
    fn resolved_threads_never_exceeds_lps() {
        let cfg = Config::new(1).with_n_threads(0);
        assert_eq!(cfg.resolved_n_threads(), 1);
    }

    #[test]
    fn default_builder_chain() {
        let cfg = Config::new(8)
            .with_n_threads(2)
            .with_termination_time(1000)
            .with_gvt_period_ms(50)
            .with_ckpt_interval(16)
            .with_serial(false);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.termination_time, Some(1000));
    }
}
