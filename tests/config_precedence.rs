use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;

fn base_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_complianceguard"));
    cmd.env("HOME", home);
    for (key, _) in std::env::vars() {
        if key.starts_with("COMPLIANCEGUARD_") {
            cmd.env_remove(key);
        }
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn make_temp_home() -> PathBuf {
    static HOME_SEQ: AtomicU64 = AtomicU64::new(0);
    let seq = HOME_SEQ.fetch_add(1, Ordering::Relaxed);
    let home = std::env::temp_dir().join(format!(
        "complianceguard-config-test-{}-{seq}",
        std::process::id()
    ));
    let _ = std::fs::remove_dir_all(&home);
    std::fs::create_dir_all(&home).expect("create home");
    home
}

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, contents).expect("write");
}

fn show_config(cmd: &mut Command) -> Value {
    let out = cmd
        .args(["--json", "config", "--show"])
        .output()
        .expect("run complianceguard");
    assert!(
        out.status.success(),
        "stderr:\n{}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("parse json")
}

#[test]
fn defaults_without_config_file() {
    let home = make_temp_home();
    let v = show_config(&mut base_cmd(&home));

    assert!(v.get("config_path").is_none());
    assert_eq!(v["scan"]["workers"], 4);
    assert_eq!(v["scan"]["parallel"], false);
    assert_eq!(v["scan"]["probe_timeout_secs"], 30);
    assert_eq!(v["scan"]["probes"], serde_json::json!([]));
    assert_eq!(v["scoring"]["not_applicable"], "include");
    assert_eq!(v["thresholds"]["screen_lock_max_idle_secs"], 1200);
    assert_eq!(v["thresholds"]["sshd_config_path"], "/etc/ssh/sshd_config");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_file_overrides_defaults() {
    let home = make_temp_home();
    write_file(
        &home.join(".config/complianceguard/config.toml"),
        r#"
[scan]
probes = ["firewall", "ssh"]
workers = 2

[scoring]
not_applicable = "exclude_from_score"

[thresholds]
screen_lock_max_idle_secs = 300
"#,
    );
    let v = show_config(&mut base_cmd(&home));

    assert!(v["config_path"].as_str().is_some_and(|p| p.ends_with("config.toml")));
    assert_eq!(v["scan"]["workers"], 2);
    assert_eq!(v["scan"]["probes"], serde_json::json!(["firewall", "ssh"]));
    assert_eq!(v["scoring"]["not_applicable"], "exclude_from_score");
    assert_eq!(v["thresholds"]["screen_lock_max_idle_secs"], 300);
    assert_eq!(v["ui"]["max_table_rows"], 20);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn env_overrides_config_file() {
    let home = make_temp_home();
    write_file(
        &home.join(".config/complianceguard/config.toml"),
        "[scan]\nworkers = 2\nparallel = false\n",
    );
    let mut cmd = base_cmd(&home);
    cmd.env("COMPLIANCEGUARD_SCAN_WORKERS", "8");
    cmd.env("COMPLIANCEGUARD_SCAN_PARALLEL", "yes");
    cmd.env("COMPLIANCEGUARD_SCAN_PROBES", "filevault, screenlock");
    cmd.env("COMPLIANCEGUARD_SCORING_NOT_APPLICABLE", "exclude");
    let v = show_config(&mut cmd);

    assert_eq!(v["scan"]["workers"], 8);
    assert_eq!(v["scan"]["parallel"], true);
    assert_eq!(
        v["scan"]["probes"],
        serde_json::json!(["filevault", "screenlock"])
    );
    assert_eq!(v["scoring"]["not_applicable"], "exclude_from_score");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn explicit_config_flag_beats_env_path() {
    let home = make_temp_home();
    let flag_path = home.join("flag.toml");
    let env_path = home.join("env.toml");
    write_file(&flag_path, "[scan]\nworkers = 3\n");
    write_file(&env_path, "[scan]\nworkers = 7\n");

    let mut cmd = base_cmd(&home);
    cmd.env("COMPLIANCEGUARD_CONFIG", &env_path);
    cmd.arg("--config").arg(&flag_path);
    let v = show_config(&mut cmd);
    assert_eq!(v["scan"]["workers"], 3);

    let mut cmd = base_cmd(&home);
    cmd.env("COMPLIANCEGUARD_CONFIG", &env_path);
    let v = show_config(&mut cmd);
    assert_eq!(v["scan"]["workers"], 7);
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn invalid_env_value_exits_2() {
    let home = make_temp_home();
    let out = base_cmd(&home)
        .env("COMPLIANCEGUARD_SCAN_PARALLEL", "sometimes")
        .args(["config", "--show"])
        .output()
        .expect("run complianceguard");
    assert_eq!(out.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("COMPLIANCEGUARD_SCAN_PARALLEL"), "{stderr}");
    let _ = std::fs::remove_dir_all(&home);
}

#[test]
fn config_show_renders_toml() {
    let home = make_temp_home();
    let out = base_cmd(&home)
        .args(["config", "--show"])
        .output()
        .expect("run complianceguard");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[scan]"), "{stdout}");
    assert!(stdout.contains("workers = 4"), "{stdout}");
    let _ = std::fs::remove_dir_all(&home);
}
