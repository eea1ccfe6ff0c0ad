use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scoring::NotApplicablePolicy;

pub const ENV_PREFIX: &str = "COMPLIANCEGUARD";

#[derive(Debug, Clone, Serialize)]
pub struct EffectiveConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub ui: UiConfig,
    pub scan: ScanConfig,
    pub scoring: ScoringConfig,
    pub report: ReportConfig,
    pub thresholds: ThresholdsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct UiConfig {
    pub color: bool,
    pub max_table_rows: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanConfig {
    /// Probe keys or ids to run; empty means every built-in probe.
    pub probes: Vec<String>,
    pub parallel: bool,
    pub workers: usize,
    pub probe_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoringConfig {
    pub not_applicable: NotApplicablePolicy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportConfig {
    pub include_evidence: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThresholdsConfig {
    pub screen_lock_max_idle_secs: u64,
    pub sshd_config_path: PathBuf,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            ui: UiConfig {
                color: true,
                max_table_rows: 20,
            },
            scan: ScanConfig {
                probes: Vec::new(),
                parallel: false,
                workers: 4,
                probe_timeout_secs: 30,
            },
            scoring: ScoringConfig {
                not_applicable: NotApplicablePolicy::Include,
            },
            report: ReportConfig {
                include_evidence: false,
            },
            thresholds: ThresholdsConfig {
                screen_lock_max_idle_secs: 1200,
                sshd_config_path: PathBuf::from("/etc/ssh/sshd_config"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    ui: Option<RawUiConfig>,
    scan: Option<RawScanConfig>,
    scoring: Option<RawScoringConfig>,
    report: Option<RawReportConfig>,
    thresholds: Option<RawThresholdsConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawUiConfig {
    color: Option<bool>,
    max_table_rows: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScanConfig {
    probes: Option<Vec<String>>,
    parallel: Option<bool>,
    workers: Option<usize>,
    probe_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawScoringConfig {
    not_applicable: Option<NotApplicablePolicy>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReportConfig {
    include_evidence: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawThresholdsConfig {
    screen_lock_max_idle_secs: Option<u64>,
    sshd_config_path: Option<PathBuf>,
}

pub fn default_config_path(home_dir: &Path) -> PathBuf {
    home_dir.join(".config/complianceguard/config.toml")
}

/// Defaults, then the TOML file (explicit path or the default location), then
/// `COMPLIANCEGUARD_*` environment variables.
pub fn load(config_path: Option<&Path>, home_dir: &Path) -> Result<EffectiveConfig> {
    let mut cfg = EffectiveConfig::default();

    let path = config_path
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| default_config_path(home_dir));

    if path.exists() {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        let raw: RawConfig = toml::from_str(&s)
            .with_context(|| format!("failed to parse config file (TOML): {}", path.display()))?;
        apply_raw_config(&mut cfg, raw);
        cfg.config_path = Some(path.display().to_string());
    } else if config_path.is_some() {
        anyhow::bail!("config file not found: {}", path.display());
    }

    apply_env_overrides(&mut cfg)?;
    validate(&cfg)?;

    Ok(cfg)
}

fn apply_raw_config(cfg: &mut EffectiveConfig, raw: RawConfig) {
    if let Some(ui) = raw.ui {
        if let Some(color) = ui.color {
            cfg.ui.color = color;
        }
        if let Some(max_table_rows) = ui.max_table_rows {
            cfg.ui.max_table_rows = max_table_rows;
        }
    }

    if let Some(scan) = raw.scan {
        if let Some(probes) = scan.probes {
            cfg.scan.probes = probes;
        }
        if let Some(parallel) = scan.parallel {
            cfg.scan.parallel = parallel;
        }
        if let Some(workers) = scan.workers {
            cfg.scan.workers = workers;
        }
        if let Some(secs) = scan.probe_timeout_secs {
            cfg.scan.probe_timeout_secs = secs;
        }
    }

    if let Some(scoring) = raw.scoring {
        if let Some(policy) = scoring.not_applicable {
            cfg.scoring.not_applicable = policy;
        }
    }

    if let Some(report) = raw.report {
        if let Some(include_evidence) = report.include_evidence {
            cfg.report.include_evidence = include_evidence;
        }
    }

    if let Some(thresholds) = raw.thresholds {
        if let Some(secs) = thresholds.screen_lock_max_idle_secs {
            cfg.thresholds.screen_lock_max_idle_secs = secs;
        }
        if let Some(path) = thresholds.sshd_config_path {
            cfg.thresholds.sshd_config_path = path;
        }
    }
}

fn env_var(suffix: &str) -> Option<(String, String)> {
    let name = format!("{ENV_PREFIX}_{suffix}");
    std::env::var(&name).ok().map(|v| (name, v))
}

fn apply_env_overrides(cfg: &mut EffectiveConfig) -> Result<()> {
    if let Some((name, v)) = env_var("UI_COLOR") {
        cfg.ui.color = parse_bool(&v).context(name)?;
    }
    if let Some((name, v)) = env_var("UI_MAX_TABLE_ROWS") {
        cfg.ui.max_table_rows = v.trim().parse::<usize>().context(name)?;
    }
    if let Some((_, v)) = env_var("SCAN_PROBES") {
        let parts: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();
        if !parts.is_empty() {
            cfg.scan.probes = parts;
        }
    }
    if let Some((name, v)) = env_var("SCAN_PARALLEL") {
        cfg.scan.parallel = parse_bool(&v).context(name)?;
    }
    if let Some((name, v)) = env_var("SCAN_WORKERS") {
        cfg.scan.workers = v.trim().parse::<usize>().context(name)?;
    }
    if let Some((name, v)) = env_var("SCAN_PROBE_TIMEOUT_SECS") {
        cfg.scan.probe_timeout_secs = v.trim().parse::<u64>().context(name)?;
    }
    if let Some((name, v)) = env_var("SCORING_NOT_APPLICABLE") {
        cfg.scoring.not_applicable = v
            .parse::<NotApplicablePolicy>()
            .map_err(anyhow::Error::msg)
            .context(name)?;
    }
    if let Some((name, v)) = env_var("REPORT_INCLUDE_EVIDENCE") {
        cfg.report.include_evidence = parse_bool(&v).context(name)?;
    }
    if let Some((name, v)) = env_var("THRESHOLDS_SCREEN_LOCK_MAX_IDLE_SECS") {
        cfg.thresholds.screen_lock_max_idle_secs = v.trim().parse::<u64>().context(name)?;
    }
    if let Some((_, v)) = env_var("THRESHOLDS_SSHD_CONFIG_PATH") {
        let v = v.trim();
        if !v.is_empty() {
            cfg.thresholds.sshd_config_path = PathBuf::from(v);
        }
    }

    Ok(())
}

fn validate(cfg: &EffectiveConfig) -> Result<()> {
    if cfg.scan.workers == 0 {
        anyhow::bail!("scan.workers must be at least 1");
    }
    if cfg.scan.probe_timeout_secs == 0 {
        anyhow::bail!("scan.probe_timeout_secs must be at least 1");
    }
    if cfg.thresholds.screen_lock_max_idle_secs == 0 {
        anyhow::bail!("thresholds.screen_lock_max_idle_secs must be at least 1");
    }
    Ok(())
}

fn parse_bool(s: &str) -> Result<bool> {
    let s = s.trim().to_ascii_lowercase();
    match s.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(anyhow::anyhow!(
            "invalid boolean: {s} (expected true|false|1|0|yes|no|on|off)"
        )),
    }
}
