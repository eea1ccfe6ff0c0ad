use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::debug;
use wait_timeout::ChildExt;

use crate::core::OsInfo;

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout and stderr joined, for tools that report on either stream.
    pub fn combined(&self) -> String {
        let mut s = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !s.is_empty() && !s.ends_with('\n') {
                s.push('\n');
            }
            s.push_str(&self.stderr);
        }
        s
    }
}

/// Credentials and environment a child process is switched to.
#[derive(Debug, Clone, Default)]
struct Identity {
    uid: u32,
    gid: u32,
    vars: Vec<(&'static str, String)>,
}

/// Run `cmd` with stdin closed and both streams captured. The child is
/// killed and an error returned when it outlives `timeout`.
pub fn run_command(cmd: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
    spawn_and_wait(cmd, args, timeout, None)
}

/// Like [`run_command`], but drops to the account that invoked `sudo` so that
/// per-user preferences are read from the right domain.
pub fn run_command_invoking_user(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<CommandOutput> {
    match invoking_user() {
        Some(user) => spawn_and_wait(cmd, args, timeout, Some(&user.identity())),
        None => run_command(cmd, args, timeout),
    }
}

fn spawn_and_wait(
    cmd: &str,
    args: &[&str],
    timeout: Duration,
    identity: Option<&Identity>,
) -> Result<CommandOutput> {
    debug!(cmd, ?args, ?timeout, "spawning command");
    let mut command = Command::new(cmd);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    if let Some(identity) = identity {
        command.envs(identity.vars.iter().map(|(k, v)| (*k, v.as_str())));
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.uid(identity.uid).gid(identity.gid);
        }
    }

    let started = Instant::now();
    let mut child = command
        .spawn()
        .with_context(|| format!("failed to start process: {cmd}"))?;

    // Drain both pipes while waiting so a chatty child cannot block on a full pipe.
    let stdout_reader = child.stdout.take().map(drain);
    let stderr_reader = child.stderr.take().map(drain);

    let waited = child
        .wait_timeout(timeout)
        .with_context(|| format!("failed to wait for process: {cmd}"))?;
    let Some(status) = waited else {
        let _ = child.kill();
        let _ = child.wait();
        return Err(anyhow!("timed out after {timeout:?}: {cmd}"));
    };

    // A background grandchild may still hold the pipes open after the child exits.
    let deadline = started + timeout;
    let timed_out = || anyhow!("timed out after {timeout:?}: {cmd}");
    let stdout = collect(stdout_reader, deadline).ok_or_else(timed_out)?;
    let stderr = collect(stderr_reader, deadline).ok_or_else(timed_out)?;

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
    });
    rx
}

/// Output of one reader, or `None` when it is still open at `deadline`.
fn collect(reader: Option<mpsc::Receiver<String>>, deadline: Instant) -> Option<String> {
    let Some(rx) = reader else {
        return Some(String::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(text) => Some(text),
        Err(mpsc::RecvTimeoutError::Disconnected) => Some(String::new()),
        Err(mpsc::RecvTimeoutError::Timeout) => None,
    }
}

pub fn is_macos() -> bool {
    cfg!(target_os = "macos")
}

/// Home directory of the user who invoked the tool, following `sudo` back to
/// the original account so config lookups are not redirected to root's.
pub fn effective_home_dir() -> Result<PathBuf> {
    match invoking_user() {
        Some(user) => Ok(user.home_dir),
        None => std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("HOME is not set")),
    }
}

/// The account behind `sudo`, from `SUDO_UID`/`SUDO_GID`/`SUDO_USER`.
#[derive(Debug, Clone)]
struct InvokingUser {
    uid: u32,
    gid: u32,
    name: Option<String>,
    home_dir: PathBuf,
}

impl InvokingUser {
    fn identity(&self) -> Identity {
        let mut vars = vec![("HOME", self.home_dir.display().to_string())];
        if let Some(name) = &self.name {
            vars.extend([("USER", name.clone()), ("LOGNAME", name.clone())]);
        }
        Identity {
            uid: self.uid,
            gid: self.gid,
            vars,
        }
    }
}

fn invoking_user() -> Option<InvokingUser> {
    let id = |var: &str| std::env::var(var).ok()?.trim().parse::<u32>().ok();
    let uid = id("SUDO_UID")?;
    Some(InvokingUser {
        uid,
        gid: id("SUDO_GID")?,
        name: std::env::var("SUDO_USER").ok().filter(|n| !n.is_empty()),
        home_dir: home_dir_for_uid(uid)?,
    })
}

/// Home directory from the password database.
#[cfg(unix)]
fn home_dir_for_uid(uid: u32) -> Option<PathBuf> {
    use std::ffi::CStr;

    // SAFETY: `sysconf` has no preconditions.
    let hint = unsafe { libc::sysconf(libc::_SC_GETPW_R_SIZE_MAX) };
    let mut buf: Vec<libc::c_char> = vec![0; usize::try_from(hint).unwrap_or(16 * 1024).max(1024)];
    // SAFETY: an all-zero `passwd` is a valid value for `getpwuid_r` to fill.
    let mut entry: libc::passwd = unsafe { std::mem::zeroed() };
    let mut found: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: every pointer refers to live, correctly sized storage owned here.
    let rc = unsafe {
        libc::getpwuid_r(uid, &mut entry, buf.as_mut_ptr(), buf.len(), &mut found)
    };
    if rc != 0 || found.is_null() || entry.pw_dir.is_null() {
        return None;
    }

    // SAFETY: on success `pw_dir` points into `buf` as a NUL-terminated string.
    let dir = unsafe { CStr::from_ptr(entry.pw_dir) }.to_string_lossy();
    let dir = dir.trim();
    (!dir.is_empty()).then(|| PathBuf::from(dir))
}

#[cfg(not(unix))]
fn home_dir_for_uid(_uid: u32) -> Option<PathBuf> {
    None
}

pub fn os_info(timeout: Duration) -> OsInfo {
    #[cfg(target_os = "macos")]
    {
        macos::os_info(timeout)
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = timeout;
        OsInfo {
            name: std::env::consts::OS.to_string(),
            version: "unknown".to_string(),
        }
    }
}

#[cfg(target_os = "macos")]
pub mod macos;
