//! Per-stage wall time and memory reporting.

use crate::pipeline::stage::Stage;
use std::fmt;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, PartialEq)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
    /// Resident memory right after the stage, in megabytes.
    pub rss_mb: Option<f64>,
}

/// Collects stage timings for one run.
pub struct RunTimer {
    system: System,
    pid: Option<Pid>,
    stages: Vec<StageTiming>,
}

impl RunTimer {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            pid: sysinfo::get_current_pid().ok(),
            stages: Vec::new(),
        }
    }

    fn current_rss_mb(&mut self) -> Option<f64> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .map(|process| process.memory() as f64 / (1024.0 * 1024.0))
    }

    pub fn record(&mut self, stage: Stage, duration: Duration) {
        let rss_mb = self.current_rss_mb();
        tracing::debug!(
            stage = %stage,
            seconds = duration.as_secs_f64(),
            rss_mb,
            "Stage finished"
        );
        self.stages.push(StageTiming {
            stage,
            duration,
            rss_mb,
        });
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            stages: self.stages.clone(),
            peak_rss_mb: crate::sys::peak_rss_mb(),
        }
    }
}

impl Default for RunTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingReport {
    pub stages: Vec<StageTiming>,
    pub peak_rss_mb: Option<f64>,
}

impl TimingReport {
    pub fn total(&self) -> Duration {
        self.stages.iter().map(|s| s.duration).sum()
    }

    /// Fraction of the total spent in `stage`, 0.0 for an empty run.
    pub fn share(&self, stage: Stage) -> f64 {
        let total = self.total().as_secs_f64();
        if total <= 0.0 {
            return 0.0;
        }
        self.stages
            .iter()
            .filter(|s| s.stage == stage)
            .map(|s| s.duration.as_secs_f64())
            .sum::<f64>()
            / total
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<22} {:>10} {:>7} {:>10}", "stage", "seconds", "share", "rss MB")?;
        for timing in &self.stages {
            let rss = timing
                .rss_mb
                .map(|mb| format!("{mb:.1}"))
                .unwrap_or_else(|| "-".to_string());
            writeln!(
                f,
                "{:<22} {:>10.2} {:>6.1}% {:>10}",
                timing.stage.name(),
                timing.duration.as_secs_f64(),
                self.share(timing.stage) * 100.0,
                rss
            )?;
        }
        write!(f, "{:<22} {:>10.2}", "total", self.total().as_secs_f64())?;
        if let Some(peak) = self.peak_rss_mb {
            write!(f, "\npeak rss: {peak:.1} MB")?;
        }
        Ok(())
    }
}
