use std::collections::HashSet;
use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::{CheckResult, Report, timestamp_now};
use crate::exit;
use crate::platform;
use crate::probe::{Probe, run_probe};
use crate::scoring::{NotApplicablePolicy, ScanStats};

pub const REPORT_SCHEMA_VERSION: &str = "1.0";

#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub parallel: bool,
    pub workers: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallel: false,
            workers: 4,
        }
    }
}

/// Receives `(index, total, title)` right before a probe starts. `index` is
/// zero-based.
pub trait ProgressSink: Sync {
    fn on_start(&self, index: usize, total: usize, title: &str);

    fn on_finish(&self, _result: &CheckResult) {}
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize, &str) + Sync,
{
    fn on_start(&self, index: usize, total: usize, title: &str) {
        self(index, total, title)
    }
}

pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn on_start(&self, _index: usize, _total: usize, _title: &str) {}
}

/// Progress bar on stderr. Only drawn when stderr is a terminal.
pub struct BarProgress {
    pb: Option<indicatif::ProgressBar>,
}

impl BarProgress {
    pub fn new(total: usize, enabled: bool) -> Self {
        if !enabled || !std::io::stderr().is_terminal() {
            return Self { pb: None };
        }
        let pb = indicatif::ProgressBar::new(total as u64);
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        if let Ok(style) =
            indicatif::ProgressStyle::with_template("{spinner} [{bar:24}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=> "));
        }
        pb.enable_steady_tick(Duration::from_millis(120));
        Self { pb: Some(pb) }
    }

    pub fn finish(&self) {
        if let Some(pb) = &self.pb {
            pb.finish_and_clear();
        }
    }
}

impl ProgressSink for BarProgress {
    fn on_start(&self, _index: usize, _total: usize, title: &str) {
        if let Some(pb) = &self.pb {
            pb.set_message(format!("Running: {title}..."));
        }
    }

    fn on_finish(&self, _result: &CheckResult) {
        if let Some(pb) = &self.pb {
            pb.inc(1);
        }
    }
}

impl Drop for BarProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Scan-wide cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Scanner {
    probes: Vec<Box<dyn Probe>>,
    opts: ScanOptions,
}

impl Scanner {
    /// Rejects probe lists that break the probe contract (empty or duplicate
    /// ids) before anything runs.
    pub fn new(probes: Vec<Box<dyn Probe>>, opts: ScanOptions) -> Result<Self> {
        let mut seen = HashSet::new();
        for (index, probe) in probes.iter().enumerate() {
            let id = probe.definition().id.trim();
            if id.is_empty() {
                return Err(exit::invalid_args(format!(
                    "probe at position {index} has an empty id"
                )));
            }
            if !seen.insert(id.to_string()) {
                return Err(exit::invalid_args(format!("duplicate probe id: {id}")));
            }
        }
        if opts.parallel && opts.workers == 0 {
            return Err(exit::invalid_args("workers must be at least 1"));
        }
        Ok(Self { probes, opts })
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Execute every probe once. Results come back in declaration order;
    /// probes skipped after cancellation produce nothing.
    pub fn run(&self, progress: &dyn ProgressSink, cancel: &CancelToken) -> Vec<CheckResult> {
        info!(
            probes = self.probes.len(),
            parallel = self.opts.parallel,
            "starting scan"
        );
        let results = if self.opts.parallel && self.probes.len() > 1 {
            match self.run_parallel(progress, cancel) {
                Ok(results) => results,
                Err(err) => {
                    debug!(error = %format!("{err:#}"), "falling back to sequential scan");
                    self.run_sequential(progress, cancel)
                }
            }
        } else {
            self.run_sequential(progress, cancel)
        };
        info!(results = results.len(), "scan finished");
        results
    }

    fn run_sequential(&self, progress: &dyn ProgressSink, cancel: &CancelToken) -> Vec<CheckResult> {
        let total = self.probes.len();
        let mut results = Vec::with_capacity(total);
        for (index, probe) in self.probes.iter().enumerate() {
            if cancel.is_cancelled() {
                debug!(skipped = total - index, "scan cancelled");
                break;
            }
            progress.on_start(index, total, &probe.definition().title);
            let result = run_probe(probe.as_ref());
            progress.on_finish(&result);
            results.push(result);
        }
        results
    }

    fn run_parallel(
        &self,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<Vec<CheckResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.opts.workers)
            .thread_name(|i| format!("complianceguard-probe-{i}"))
            .build()
            .context("failed to build probe worker pool")?;

        let total = self.probes.len();
        let slots: Vec<Option<CheckResult>> = pool.install(|| {
            self.probes
                .par_iter()
                .enumerate()
                .map(|(index, probe)| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    progress.on_start(index, total, &probe.definition().title);
                    let result = run_probe(probe.as_ref());
                    progress.on_finish(&result);
                    Some(result)
                })
                .collect()
        });
        Ok(slots.into_iter().flatten().collect())
    }
}

/// Wrap a finished result set into the exported report document.
pub fn build_report(
    results: Vec<CheckResult>,
    policy: NotApplicablePolicy,
    include_evidence: bool,
    timeout: Duration,
) -> Report {
    let summary = ScanStats::from_results(&results, policy);
    let results = if include_evidence {
        results
    } else {
        results
            .into_iter()
            .map(|mut r| {
                r.evidence = None;
                r
            })
            .collect()
    };

    Report {
        schema_version: REPORT_SCHEMA_VERSION.to_string(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        os: platform::os_info(std::cmp::min(timeout, Duration::from_secs(2))),
        generated_at: timestamp_now(),
        summary,
        results,
    }
}
