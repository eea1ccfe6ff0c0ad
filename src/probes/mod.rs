//! Built-in macOS controls (CIS macOS 14 benchmark) and the registry that
//! resolves them by key or id.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

use crate::config::EffectiveConfig;
use crate::exit;
use crate::platform;
use crate::probe::{Probe, ProbeOutcome};

mod access;
mod network;
mod system;

pub use access::ScreenLockProbe;
pub use network::{FirewallProbe, SshProbe};
pub use system::{FileVaultProbe, SoftwareUpdatesProbe};

/// Settings the built-in probes read. Built once per run from the effective
/// configuration.
#[derive(Debug, Clone)]
pub struct ProbeContext {
    /// Upper bound for any single external command.
    pub timeout: Duration,
    pub screen_lock_max_idle_secs: u64,
    pub sshd_config_path: PathBuf,
}

impl ProbeContext {
    pub fn from_config(cfg: &EffectiveConfig, timeout: Duration) -> Self {
        Self {
            timeout,
            screen_lock_max_idle_secs: cfg.thresholds.screen_lock_max_idle_secs,
            sshd_config_path: cfg.thresholds.sshd_config_path.clone(),
        }
    }

    /// The probe's own budget, never longer than the configured cap.
    pub(crate) fn budget(&self, natural: Duration) -> Duration {
        std::cmp::min(self.timeout, natural)
    }
}

impl Default for ProbeContext {
    fn default() -> Self {
        Self::from_config(&EffectiveConfig::default(), Duration::from_secs(30))
    }
}

/// Registry keys in declaration order.
pub const KEYS: &[&str] = &["updates", "firewall", "filevault", "screenlock", "ssh"];

pub fn by_key(key: &str, ctx: &ProbeContext) -> Option<Box<dyn Probe>> {
    let probe: Box<dyn Probe> = match key {
        "updates" => Box::new(SoftwareUpdatesProbe::new(ctx)),
        "firewall" => Box::new(FirewallProbe::new(ctx)),
        "filevault" => Box::new(FileVaultProbe::new(ctx)),
        "screenlock" => Box::new(ScreenLockProbe::new(ctx)),
        "ssh" => Box::new(SshProbe::new(ctx)),
        _ => return None,
    };
    Some(probe)
}

pub fn builtin(ctx: &ProbeContext) -> Vec<Box<dyn Probe>> {
    KEYS.iter().filter_map(|k| by_key(k, ctx)).collect()
}

/// Resolve registry keys or control ids (case-insensitive) to probes, in the
/// order given. An empty selection means every built-in probe. Repeated
/// selections of the same probe collapse to the first.
pub fn select<S: AsRef<str>>(keys: &[S], ctx: &ProbeContext) -> Result<Vec<Box<dyn Probe>>> {
    if keys.is_empty() {
        return Ok(builtin(ctx));
    }

    let mut chosen: Vec<&'static str> = Vec::new();
    for raw in keys {
        let key = resolve_key(raw.as_ref(), ctx).ok_or_else(|| {
            exit::invalid_args(format!(
                "unknown probe: {} (valid: {})",
                raw.as_ref().trim(),
                KEYS.join(", ")
            ))
        })?;
        if !chosen.contains(&key) {
            chosen.push(key);
        }
    }
    Ok(chosen.into_iter().filter_map(|k| by_key(k, ctx)).collect())
}

fn resolve_key(raw: &str, ctx: &ProbeContext) -> Option<&'static str> {
    let wanted = raw.trim();
    if wanted.is_empty() {
        return None;
    }
    KEYS.iter().copied().find(|key| {
        key.eq_ignore_ascii_case(wanted)
            || by_key(key, ctx).is_some_and(|p| p.definition().id.eq_ignore_ascii_case(wanted))
    })
}

/// `Some(N/A outcome)` when the host cannot be audited by macOS probes.
pub(crate) fn require_macos() -> Option<ProbeOutcome> {
    if platform::is_macos() {
        return None;
    }
    Some(ProbeOutcome::not_applicable(format!(
        "Control applies to macOS only (running on {})",
        std::env::consts::OS
    )))
}

/// First `max` characters of `s`, on a char boundary.
pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
